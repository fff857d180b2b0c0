use serde::{Deserialize, Serialize};
use url::Url;

/// One entry of the backend's listing of stored files.
///
/// Only `originalFilename` and `fileSize` are required; the remaining
/// backend-assigned fields are carried when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub original_filename: String,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, rename = "s3ObjectKey", skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<String>,
}

impl FileRecord {
    pub fn new(original_filename: impl Into<String>, file_size: u64) -> Self {
        Self {
            original_filename: original_filename.into(),
            file_size,
            file_id: None,
            object_key: None,
            upload_timestamp: None,
        }
    }

    pub fn size_kib(&self) -> String {
        format_kib(self.file_size)
    }
}

/// Single-use write authorization returned by the credential endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCredential {
    pub upload_url: Url,
    pub key: String,
}

/// Renders `bytes / 1024` with two decimals, rounding half up.
pub fn format_kib(bytes: u64) -> String {
    let hundredths = (u128::from(bytes) * 100 + 512) / 1024;
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}
