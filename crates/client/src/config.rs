//! Session target configuration and environment loading.

use hubview_shared::{is_local_address, ClientError, SUBSCRIBER_ROLE};
use url::Url;

use crate::credential::{Credential, Secret};
use crate::storage::Preferences;

const DEFAULT_ENDPOINT: &str = "ws://localhost:8787";

/// The hub and room the session should be subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint_base: String,
    pub room_id: String,
    /// Token already in hand.
    pub credential: Option<Credential>,
    /// Exchanged for a credential when none is usable.
    pub secret: Option<Secret>,
    /// Refuse to connect without a credential.
    pub require_credential: bool,
}

impl SessionConfig {
    pub fn new(endpoint_base: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            endpoint_base: endpoint_base.into(),
            room_id: room_id.into(),
            credential: None,
            secret: None,
            require_credential: false,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn requiring_credential(mut self, require: bool) -> Self {
        self.require_credential = require;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint_base.trim().is_empty() {
            return Err(ClientError::Config("hub endpoint is required".to_string()));
        }
        if self.room_id.trim().is_empty() {
            return Err(ClientError::Config("room id is required".to_string()));
        }
        Ok(())
    }

    /// Whether `other` points at the same endpoint and room with the same
    /// way of authenticating, ignoring any cached credential.
    pub(crate) fn same_target(&self, other: &SessionConfig) -> bool {
        self.endpoint_base.trim() == other.endpoint_base.trim()
            && self.room_id.trim() == other.room_id.trim()
            && self.secret == other.secret
            && self.require_credential == other.require_credential
    }

    /// Full subscriber URI for the hub.
    pub fn hub_url(&self, token: Option<&str>) -> Result<Url, ClientError> {
        let base = ws_base(self.endpoint_base.trim());
        let mut url = Url::parse(&base)
            .map_err(|e| ClientError::Config(format!("invalid hub endpoint '{base}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("role", SUBSCRIBER_ROLE);
            query.append_pair("room", self.room_id.trim());
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

/// Map an endpoint to a ws:// or wss:// base. Bare hosts get ws:// when
/// they are local and wss:// otherwise.
fn ws_base(endpoint: &str) -> String {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if is_local_address(endpoint) {
        format!("ws://{endpoint}")
    } else {
        format!("wss://{endpoint}")
    }
}

/// Render a hub URL for logs with the token masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "<redacted>".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string().replace("%3Credacted%3E", "<redacted>")
}

/// Derive the default issuer URL from the hub endpoint.
pub fn default_issuer_url(endpoint: &str) -> String {
    let base = ws_base(endpoint.trim());
    let http = if let Some(rest) = base.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = base.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        base
    };
    format!("{}/token", http.trim_end_matches('/'))
}

/// Process configuration for the `hubview` binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub issuer_url: String,
}

impl ClientConfig {
    /// Read configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HUBVIEW_ENDPOINT`: hub base URL or host (default: "ws://localhost:8787")
    /// - `HUBVIEW_ROOM`: room to subscribe to (required to connect)
    /// - `HUBVIEW_TOKEN`: ready-made credential
    /// - `HUBVIEW_SECRET` / `HUBVIEW_INVITE`: exchanged with the issuer for a credential
    /// - `HUBVIEW_ISSUER_URL`: credential issuer (default: "{endpoint as http(s)}/token")
    /// - `HUBVIEW_REQUIRE_AUTH`: "1"/"true" or "0"/"false", overrides the stored preference
    pub fn from_env(prefs: &Preferences) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), prefs)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, prefs: &Preferences) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = var("HUBVIEW_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let room = var("HUBVIEW_ROOM").unwrap_or_default();
        let issuer_url =
            var("HUBVIEW_ISSUER_URL").unwrap_or_else(|| default_issuer_url(&endpoint));
        let require_credential = var("HUBVIEW_REQUIRE_AUTH")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(prefs.require_auth);

        let mut session = SessionConfig::new(endpoint, room).requiring_credential(require_credential);
        if let Some(token) = var("HUBVIEW_TOKEN") {
            session = session.with_credential(Credential::new(token));
        }
        if let Some(secret) = var("HUBVIEW_SECRET") {
            session = session.with_secret(Secret::Password(secret));
        } else if let Some(invite) = var("HUBVIEW_INVITE") {
            session = session.with_secret(Secret::Invite(invite));
        }

        Self {
            session,
            issuer_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn validate_requires_endpoint_and_room() {
        assert!(SessionConfig::new("ws://hub", "room123").validate().is_ok());
        assert!(matches!(
            SessionConfig::new("", "room123").validate(),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::new("ws://hub", "  ").validate(),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn hub_url_carries_role_room_and_token() {
        let config = SessionConfig::new("wss://hub.example.com/ws", "room 1");
        let url = config.hub_url(Some("t/k")).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ws");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("role".to_string(), "sub".to_string()),
                ("room".to_string(), "room 1".to_string()),
                ("token".to_string(), "t/k".to_string()),
            ]
        );
    }

    #[test]
    fn endpoints_map_to_websocket_schemes() {
        assert_eq!(ws_base("https://hub.example.com"), "wss://hub.example.com");
        assert_eq!(ws_base("http://localhost:8787"), "ws://localhost:8787");
        assert_eq!(ws_base("localhost:8787"), "ws://localhost:8787");
        assert_eq!(ws_base("hub.example.com"), "wss://hub.example.com");
    }

    #[test]
    fn redacted_url_hides_token() {
        let url = SessionConfig::new("ws://localhost:8787", "room123")
            .hub_url(Some("secret-token"))
            .unwrap();
        let shown = redact_url(&url);
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("token=<redacted>"));
        assert!(shown.contains("room=room123"));
    }

    #[test]
    fn issuer_url_defaults_from_endpoint() {
        assert_eq!(default_issuer_url("wss://hub.example.com/"), "https://hub.example.com/token");
        assert_eq!(default_issuer_url("localhost:8787"), "http://localhost:8787/token");
    }

    #[test]
    fn from_lookup_reads_environment() {
        let config = ClientConfig::from_lookup(
            lookup(&[
                ("HUBVIEW_ENDPOINT", "wss://hub.example.com"),
                ("HUBVIEW_ROOM", "room123"),
                ("HUBVIEW_INVITE", "inv-1"),
            ]),
            &Preferences { require_auth: true },
        );

        assert_eq!(config.session.room_id, "room123");
        assert_eq!(config.session.secret, Some(Secret::Invite("inv-1".into())));
        assert!(config.session.credential.is_none());
        assert!(config.session.require_credential);
        assert_eq!(config.issuer_url, "https://hub.example.com/token");
    }

    #[test]
    fn env_overrides_stored_auth_preference() {
        let config = ClientConfig::from_lookup(
            lookup(&[("HUBVIEW_REQUIRE_AUTH", "false"), ("HUBVIEW_TOKEN", "tok")]),
            &Preferences { require_auth: true },
        );
        assert!(!config.session.require_credential);
        assert_eq!(config.session.endpoint_base, DEFAULT_ENDPOINT);
        assert_eq!(config.session.credential, Some(Credential::new("tok")));
    }

    #[test]
    fn same_target_ignores_cached_credential() {
        let a = SessionConfig::new("ws://hub", "room123").with_secret(Secret::Password("pw".into()));
        let b = a.clone().with_credential(Credential::new("tok"));
        assert!(a.same_target(&b));
        assert!(!a.same_target(&SessionConfig::new("ws://hub", "room456")));
    }
}
