use thiserror::Error;

/// Reasons a credential body returned with a success status is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("upload url is not a valid absolute url: {0}")]
    InvalidUploadUrl(String),
    #[error("upload url scheme `{0}` is not http or https")]
    UnsupportedScheme(String),
}
