//! Exchanging a user secret for a short-lived hub credential.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hubview_shared::{
    try_problem_detail, AuthError, CredentialRequest, CredentialResponse, SUBSCRIBER_ROLE,
};
use reqwest::{Client, StatusCode};

/// What the user hands over to obtain a credential. Never persisted,
/// never logged.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    Invite(String),
}

impl Secret {
    pub fn expose(&self) -> &str {
        match self {
            Secret::Password(value) | Secret::Invite(value) => value,
        }
    }

    fn request_for(&self, room_id: &str) -> CredentialRequest {
        let (secret, invite) = match self {
            Secret::Password(value) => (Some(value.clone()), None),
            Secret::Invite(value) => (None, Some(value.clone())),
        };
        CredentialRequest {
            room: room_id.to_string(),
            role: SUBSCRIBER_ROLE.to_string(),
            secret,
            invite,
        }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password(<redacted>)"),
            Secret::Invite(_) => f.write_str("Invite(<redacted>)"),
        }
    }
}

/// Bearer token for the hub plus the issuer's expiry hint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Build from an issuer response. Falls back to the token's own `exp`
    /// claim when the issuer gives no hint.
    pub fn from_response(response: CredentialResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_at
            .or_else(|| {
                response
                    .expires_in
                    .and_then(|secs| i64::try_from(secs).ok())
                    .map(|secs| now + Duration::seconds(secs))
            })
            .or_else(|| jwt_expiry(&response.token));
        Self {
            token: response.token,
            expires_at,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Read the `exp` claim of a JWT without verifying it. The hub does the
/// verifying; this is only a hint for when to stop reusing the token.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Exchange `secret` for a credential scoped to `room_id`. No retries.
    async fn fetch_credential(&self, room_id: &str, secret: &Secret)
        -> Result<Credential, AuthError>;
}

/// Talks to the credential issuer over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCredentialProvider {
    client: Client,
    issuer_url: String,
}

impl HttpCredentialProvider {
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            issuer_url: issuer_url.into(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch_credential(
        &self,
        room_id: &str,
        secret: &Secret,
    ) -> Result<Credential, AuthError> {
        let body = secret.request_for(room_id);
        crate::log_debug!("requesting credential for room '{}' from {}", room_id, self.issuer_url);

        let resp = self
            .client
            .post(&self.issuer_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.without_url().to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Unreachable(format!("failed to read body: {}", e.without_url())))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = try_problem_detail(&text).map(|d| scrub(d, secret));
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        if !status.is_success() {
            return Err(AuthError::Unreachable(format!(
                "issuer returned HTTP {}",
                status.as_u16()
            )));
        }

        let response: CredentialResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::Unreachable(format!("invalid issuer response: {e}")))?;
        if response.token.trim().is_empty() {
            return Err(AuthError::Unreachable("issuer returned an empty token".to_string()));
        }
        Ok(Credential::from_response(response, Utc::now()))
    }
}

fn scrub(detail: String, secret: &Secret) -> String {
    let value = secret.expose();
    if value.is_empty() {
        detail
    } else {
        detail.replace(value, "<redacted>")
    }
}
