//! Error taxonomy shared by the session core and its collaborators.

use serde::Deserialize;

/// RFC7807 Problem Details body, as returned by the credential issuer on
/// rejection. Only the fields we surface are decoded.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Failure to obtain a credential from the issuer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The issuer answered and refused. `detail` comes from the issuer's
    /// problem body and never echoes the submitted secret.
    #[error("credential rejected by issuer (HTTP {status}){}", detail_suffix(.detail))]
    Rejected { status: u16, detail: Option<String> },
    #[error("credential issuer unreachable: {0}")]
    Unreachable(String),
}

/// Errors surfaced by the client core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// A required configuration field is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("transport error: {0}")]
    Transport(String),
    /// The frame was text but not a well-formed hub message.
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String, raw: String },
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}
