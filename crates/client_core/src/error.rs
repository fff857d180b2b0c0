use shared::error::CredentialValidationError;
use thiserror::Error;

/// Fallback used when the credential endpoint rejects a request without a message.
pub const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("please select a file first")]
    NoFileSelected,
    #[error("an upload is already in progress")]
    UploadInFlight,
    #[error("API error ({status}): {message}")]
    CredentialRejected { status: u16, message: String },
    #[error("credential request failed: {0}")]
    CredentialTransport(String),
    #[error("invalid upload credential: {0}")]
    InvalidCredential(#[from] CredentialValidationError),
    /// The storage body is never inspected, so the rendered message is fixed.
    #[error("failed to upload file to storage")]
    Transfer { status: Option<u16>, detail: String },
    #[error("{phase} timed out")]
    TimedOut { phase: &'static str },
    #[error("upload cancelled")]
    Cancelled,
    /// The attempt was dropped or panicked before reaching a terminal phase.
    #[error("upload interrupted")]
    Interrupted,
}

impl UploadError {
    pub fn transfer_status(status: u16) -> Self {
        Self::Transfer {
            status: Some(status),
            detail: format!("storage responded with status {status}"),
        }
    }

    pub fn transfer_transport(detail: impl Into<String>) -> Self {
        Self::Transfer {
            status: None,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ListFetchError {
    #[error("failed to fetch file list (status {status})")]
    Rejected { status: u16 },
    #[error("{0}")]
    Transport(String),
    #[error("malformed file list: {0}")]
    Malformed(String),
    #[error("file list request timed out")]
    TimedOut,
}
