//! HTTP capability behind the upload and listing components.

use std::{convert::Infallible, future::Future, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Body, Client, RequestBuilder,
};
use shared::{
    domain::{FileRecord, UploadCredential},
    protocol::{ErrorBody, PresignRequest, PresignResponse},
};
use tokio::sync::watch;
use tracing::warn;
use url::Url;

use crate::error::{ListFetchError, UploadError, UNKNOWN_ERROR};

#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Phase 1: ask the backend for a single-use write location.
    async fn request_credential(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential, UploadError>;

    /// Phase 2: write the raw bytes to the pre-authorized location.
    async fn put_object(
        &self,
        upload_url: &Url,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), UploadError>;

    async fn list_files(&self) -> Result<Vec<FileRecord>, ListFetchError>;
}

/// Bodies are handed to the connection in slices of this size so a transfer
/// can report progress while it runs.
const PUT_CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpUploadBackend {
    http: Client,
    base_url: String,
    /// Total deadline for credential and list calls; stall window for transfers.
    timeout: Option<Duration>,
}

impl HttpUploadBackend {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url).with_timeout(timeout))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn deadline(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

/// Splits `body` into zero-copy slices and bumps `progress` by each slice's
/// length as the connection pulls it. The sender is dropped with the stream.
fn progress_body(body: Bytes, progress: watch::Sender<u64>) -> Body {
    let chunks: Vec<Bytes> = (0..body.len())
        .step_by(PUT_CHUNK_SIZE)
        .map(|start| body.slice(start..body.len().min(start + PUT_CHUNK_SIZE)))
        .collect();
    Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
        progress.send_modify(|sent| *sent += chunk.len() as u64);
        Ok::<_, Infallible>(chunk)
    })))
}

/// Resolves once `progress` has gone `stall` without advancing. After the
/// sender is dropped the response gets one more `stall` window.
async fn stalled(mut progress: watch::Receiver<u64>, stall: Duration) {
    loop {
        match tokio::time::timeout(stall, progress.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => break,
            Err(_) => return,
        }
    }
    tokio::time::sleep(stall).await;
}

/// Runs `request` until it finishes or stops making progress. `None` means it stalled.
async fn unless_stalled<T>(
    progress: watch::Receiver<u64>,
    stall: Option<Duration>,
    request: impl Future<Output = T>,
) -> Option<T> {
    let Some(stall) = stall else {
        return Some(request.await);
    };
    tokio::select! {
        result = request => Some(result),
        _ = stalled(progress, stall) => None,
    }
}

#[async_trait]
impl UploadBackend for HttpUploadBackend {
    async fn request_credential(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential, UploadError> {
        let response = self
            .deadline(self.http.post(self.endpoint("generate-presigned-url")))
            .json(&PresignRequest {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::TimedOut {
                        phase: "credential request",
                    }
                } else {
                    UploadError::CredentialTransport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            return Err(UploadError::CredentialRejected {
                status: status.as_u16(),
                message: body.message_or(UNKNOWN_ERROR),
            });
        }

        let body: PresignResponse = response
            .json()
            .await
            .map_err(|e| UploadError::CredentialTransport(format!("unreadable response: {e}")))?;
        Ok(body.into_credential()?)
    }

    async fn put_object(
        &self,
        upload_url: &Url,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), UploadError> {
        let length = body.len() as u64;
        let (progress, watcher) = watch::channel(0u64);
        // Explicit length keeps the streamed body from going out chunked;
        // presigned PUTs reject chunked transfer encoding.
        let mut request = self
            .http
            .put(upload_url.clone())
            .header(CONTENT_LENGTH, length)
            .body(progress_body(body, progress));
        if !content_type.is_empty() {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = unless_stalled(watcher.clone(), self.timeout, request.send())
            .await
            .ok_or_else(|| {
                warn!(
                    sent = *watcher.borrow(),
                    total = length,
                    "storage transfer stalled"
                );
                UploadError::TimedOut {
                    phase: "storage transfer",
                }
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::TimedOut {
                        phase: "storage transfer",
                    }
                } else {
                    UploadError::transfer_transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::transfer_status(status.as_u16()));
        }
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, ListFetchError> {
        let response = self
            .deadline(self.http.get(self.endpoint("files")))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ListFetchError::TimedOut
                } else {
                    ListFetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListFetchError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ListFetchError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
