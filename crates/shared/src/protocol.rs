//! Hub and credential-issuer wire definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role the viewer connects to the hub with.
pub const SUBSCRIBER_ROLE: &str = "sub";

/// Message type that bundles one sub-message per event type.
pub const SNAPSHOT_TYPE: &str = "snapshot";

/// Bucket used when a message carries no producer id or no type.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Inbound hub message.
///
/// Every field is optional on the wire. Unknown fields are ignored so
/// producers can add data without breaking older viewers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl InboundMessage {
    pub fn is_snapshot(&self) -> bool {
        self.kind.as_deref() == Some(SNAPSHOT_TYPE)
    }
}

/// Close codes the hub uses to explain why it dropped a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubCloseCode {
    /// 1000, clean close.
    Normal,
    /// 1006, connection lost without a close frame.
    Abnormal,
    /// 4001, the requested role is not allowed.
    InvalidRole,
    /// 4002, the credential is missing or invalid.
    InvalidCredential,
    /// 4003, the credential has expired.
    CredentialExpired,
    /// 4004, the credential's claims do not match the room or role.
    ClaimsMismatch,
    Other(u16),
}

impl HubCloseCode {
    pub fn code(self) -> u16 {
        match self {
            HubCloseCode::Normal => 1000,
            HubCloseCode::Abnormal => 1006,
            HubCloseCode::InvalidRole => 4001,
            HubCloseCode::InvalidCredential => 4002,
            HubCloseCode::CredentialExpired => 4003,
            HubCloseCode::ClaimsMismatch => 4004,
            HubCloseCode::Other(code) => code,
        }
    }

    /// Short operator-facing hint for codes that need user action.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            HubCloseCode::InvalidRole => Some("hub rejected the subscriber role; check the room settings"),
            HubCloseCode::InvalidCredential => Some("credential missing or invalid; supply a new secret or token"),
            HubCloseCode::CredentialExpired => Some("credential expired"),
            HubCloseCode::ClaimsMismatch => Some("credential was issued for a different room or role"),
            _ => None,
        }
    }
}

impl From<u16> for HubCloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => HubCloseCode::Normal,
            1006 => HubCloseCode::Abnormal,
            4001 => HubCloseCode::InvalidRole,
            4002 => HubCloseCode::InvalidCredential,
            4003 => HubCloseCode::CredentialExpired,
            4004 => HubCloseCode::ClaimsMismatch,
            other => HubCloseCode::Other(other),
        }
    }
}

/// Body posted to the credential issuer.
///
/// Exactly one of `secret` or `invite` is set.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub room: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<String>,
}

impl std::fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("room", &self.room)
            .field("role", &self.role)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("invite", &self.invite.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Successful issuer response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub token: String,
    /// Lifetime in seconds from now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Check if a host is a local/development address.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}
