use serde::{Deserialize, Serialize};
use url::Url;

use crate::{domain::UploadCredential, error::CredentialValidationError};

/// Body of `POST /generate-presigned-url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub file_name: String,
    pub content_type: String,
}

/// Success body of the credential endpoint, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

impl PresignResponse {
    pub fn into_credential(self) -> Result<UploadCredential, CredentialValidationError> {
        let upload_url = self
            .upload_url
            .filter(|v| !v.trim().is_empty())
            .ok_or(CredentialValidationError::MissingField("uploadUrl"))?;
        let key = self
            .key
            .filter(|v| !v.is_empty())
            .ok_or(CredentialValidationError::MissingField("key"))?;

        let upload_url = Url::parse(upload_url.trim())
            .map_err(|e| CredentialValidationError::InvalidUploadUrl(e.to_string()))?;
        match upload_url.scheme() {
            "http" | "https" => {}
            other => return Err(CredentialValidationError::UnsupportedScheme(other.to_string())),
        }

        Ok(UploadCredential { upload_url, key })
    }
}

/// Error body of the credential endpoint: `{ "error"?: string }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn message_or(self, fallback: &str) -> String {
        self.error
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}
