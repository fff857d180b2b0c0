use std::{sync::Arc, time::Duration};

use shared::domain::FileRecord;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

use crate::{
    error::ListFetchError,
    events::{ClientEvent, ListView},
    transport::UploadBackend,
};

/// Fetches the stored file set and keeps the rendered list in sync with it.
///
/// There is no in-flight lock: overlapping refreshes each apply their own
/// result when they resolve, so the last one to finish wins.
pub struct ListSynchronizer {
    backend: Arc<dyn UploadBackend>,
    timeout: Option<Duration>,
    view: RwLock<ListView>,
    events: broadcast::Sender<ClientEvent>,
}

impl ListSynchronizer {
    pub fn new(
        backend: Arc<dyn UploadBackend>,
        timeout: Option<Duration>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            backend,
            timeout,
            view: RwLock::new(ListView::Loading),
            events,
        }
    }

    pub async fn refresh(&self) {
        self.render(ListView::Loading).await;

        let view = match self.fetch().await {
            Ok(records) => {
                info!(count = records.len(), "file list fetched");
                ListView::from_records(&records)
            }
            Err(err) => {
                error!(error = %err, "failed to fetch file list");
                ListView::Failed(err.to_string())
            }
        };
        self.render(view).await;
    }

    pub async fn view(&self) -> ListView {
        self.view.read().await.clone()
    }

    async fn fetch(&self) -> Result<Vec<FileRecord>, ListFetchError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.list_files())
                .await
                .map_err(|_| ListFetchError::TimedOut)?,
            None => self.backend.list_files().await,
        }
    }

    async fn render(&self, view: ListView) {
        *self.view.write().await = view.clone();
        let _ = self.events.send(ClientEvent::ListRendered(view));
    }
}

#[cfg(test)]
#[path = "tests/list_sync_tests.rs"]
mod tests;
