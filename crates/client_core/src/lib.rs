use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::info;

pub mod config;
pub mod error;
pub mod events;
pub mod list_sync;
pub mod orchestrator;
pub mod transport;

pub use config::{load_settings, ClientSettings};
pub use error::{ListFetchError, UploadError};
pub use events::{ClientEvent, ListView, UploadPhase, UploadStatus, UploadSummary};
pub use list_sync::ListSynchronizer;
pub use orchestrator::{SelectedFile, UploadOrchestrator, UploadOutcome};
pub use transport::{HttpUploadBackend, UploadBackend};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Wires the list synchronizer and the upload orchestrator onto one backend
/// and one event channel.
pub struct UploaderApp {
    orchestrator: Arc<UploadOrchestrator>,
    list: Arc<ListSynchronizer>,
    events: broadcast::Sender<ClientEvent>,
}

impl UploaderApp {
    pub fn new(settings: &ClientSettings) -> anyhow::Result<Self> {
        let backend = HttpUploadBackend::new(settings.api_base_url.clone(), settings.request_timeout)
            .context("failed to build HTTP client")?;
        info!(api_base_url = %settings.api_base_url, "uploader client configured");
        Ok(Self::with_backend(Arc::new(backend), settings.request_timeout))
    }

    pub fn with_backend(backend: Arc<dyn UploadBackend>, timeout: Option<Duration>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let list = Arc::new(ListSynchronizer::new(
            Arc::clone(&backend),
            timeout,
            events.clone(),
        ));
        let orchestrator = Arc::new(UploadOrchestrator::new(
            backend,
            Arc::clone(&list),
            timeout,
            events.clone(),
        ));
        Self {
            orchestrator,
            list,
            events,
        }
    }

    /// Startup refresh of the file list.
    pub async fn start(&self) {
        info!("loading initial file list");
        self.list.refresh().await;
    }

    pub fn orchestrator(&self) -> &Arc<UploadOrchestrator> {
        &self.orchestrator
    }

    pub fn list(&self) -> &Arc<ListSynchronizer> {
        &self.list
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
