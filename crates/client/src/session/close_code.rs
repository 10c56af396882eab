//! How the session reacts to each hub close code.

use hubview_shared::HubCloseCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// Normal close; stay disconnected.
    Clean,
    /// Room or role is wrong; the user has to fix the configuration.
    FatalConfig,
    /// Credential is missing or invalid; the user has to supply a new one.
    FatalCredential,
    /// Credential expired; refresh it if one was in use.
    CredentialExpired,
    /// Anything else; retry with backoff.
    Transient,
}

pub fn classify(code: HubCloseCode) -> CloseClass {
    match code {
        HubCloseCode::Normal => CloseClass::Clean,
        HubCloseCode::InvalidRole | HubCloseCode::ClaimsMismatch => CloseClass::FatalConfig,
        HubCloseCode::InvalidCredential => CloseClass::FatalCredential,
        HubCloseCode::CredentialExpired => CloseClass::CredentialExpired,
        HubCloseCode::Abnormal | HubCloseCode::Other(_) => CloseClass::Transient,
    }
}
