//! Two-phase upload: request a write credential, then transfer directly to storage.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use shared::domain::UploadCredential;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::UploadError,
    events::{ClientEvent, UploadPhase, UploadStatus, UploadSummary},
    list_sync::ListSynchronizer,
    transport::UploadBackend,
};

/// The file chosen by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    /// Passed through verbatim; may be empty.
    pub content_type: String,
    pub content: Bytes,
}

impl SelectedFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// Refused before any network call.
    Rejected(UploadError),
    Succeeded(UploadSummary),
    Failed(UploadError),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[derive(Default)]
struct UploadSession {
    selected: Option<Arc<SelectedFile>>,
    status: UploadStatus,
    phase: UploadPhase,
    summary: Option<UploadSummary>,
    cancel: Option<CancellationToken>,
}

/// Owns one accepted attempt. Dropping it re-enables the trigger, so the
/// trigger comes back even when the `trigger_upload` future is dropped or the
/// backend panics.
struct AttemptGuard<'a> {
    orchestrator: &'a UploadOrchestrator,
    terminal: Option<UploadPhase>,
}

impl AttemptGuard<'_> {
    fn complete(mut self, phase: UploadPhase) {
        self.terminal = Some(phase);
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let orchestrator = self.orchestrator;
        let mut session = orchestrator.session();
        if self.terminal.is_none() {
            warn!(phase = ?session.phase, "upload attempt abandoned before completion");
            session.status = UploadStatus::Failed(UploadError::Interrupted.to_string());
            orchestrator.emit(ClientEvent::StatusChanged(session.status.clone()));
        }
        let phase = self.terminal.unwrap_or(UploadPhase::Failed);
        session.cancel = None;
        session.phase = phase;
        orchestrator.emit(ClientEvent::PhaseChanged(phase));
        orchestrator.emit(ClientEvent::TriggerChanged { enabled: true });
    }
}

pub struct UploadOrchestrator {
    backend: Arc<dyn UploadBackend>,
    list: Arc<ListSynchronizer>,
    timeout: Option<Duration>,
    session: Mutex<UploadSession>,
    events: broadcast::Sender<ClientEvent>,
}

impl UploadOrchestrator {
    pub fn new(
        backend: Arc<dyn UploadBackend>,
        list: Arc<ListSynchronizer>,
        timeout: Option<Duration>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            backend,
            list,
            timeout,
            session: Mutex::new(UploadSession::default()),
            events,
        }
    }

    /// Replaces the selection. An upload already in flight keeps the file it started with.
    pub fn select_file(&self, file: Option<SelectedFile>) {
        let mut session = self.session();
        match file {
            Some(file) => {
                info!(file = %file.name, content_type = %file.content_type, "file selected");
                session.status = UploadStatus::Selected(file.name.clone());
                session.selected = Some(Arc::new(file));
                session.summary = None;
                self.emit(ClientEvent::SummaryChanged(None));
            }
            None => {
                session.selected = None;
                session.status = UploadStatus::NoFileSelected;
            }
        }
        self.emit(ClientEvent::StatusChanged(session.status.clone()));
    }

    pub async fn trigger_upload(&self) -> UploadOutcome {
        let (attempt, file, token) = match self.begin() {
            Ok(started) => started,
            Err(err) => return UploadOutcome::Rejected(err),
        };

        match self.run_phases(&file, &token).await {
            Ok(credential) => {
                let summary = UploadSummary {
                    file_name: file.name.clone(),
                    key: credential.key,
                };
                info!(file = %summary.file_name, key = %summary.key, "upload succeeded");
                {
                    let mut session = self.session();
                    session.cancel = None;
                    session.status = UploadStatus::Succeeded;
                    session.summary = Some(summary.clone());
                    session.phase = UploadPhase::RefreshingList;
                    self.emit(ClientEvent::StatusChanged(UploadStatus::Succeeded));
                    self.emit(ClientEvent::SummaryChanged(Some(summary.clone())));
                    self.emit(ClientEvent::PhaseChanged(UploadPhase::RefreshingList));
                }
                self.list.refresh().await;
                attempt.complete(UploadPhase::Succeeded);
                UploadOutcome::Succeeded(summary)
            }
            Err(err) => {
                error!(file = %file.name, error = ?err, "upload failed");
                {
                    let mut session = self.session();
                    session.status = UploadStatus::Failed(err.to_string());
                    self.emit(ClientEvent::StatusChanged(session.status.clone()));
                }
                attempt.complete(UploadPhase::Failed);
                UploadOutcome::Failed(err)
            }
        }
    }

    /// Cancels the credential request or transfer in flight, if any.
    pub fn cancel_upload(&self) -> bool {
        let session = self.session();
        match &session.cancel {
            Some(token) if !token.is_cancelled() => {
                info!("cancelling upload in flight");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.session().status.clone()
    }

    pub fn phase(&self) -> UploadPhase {
        self.session().phase
    }

    pub fn summary(&self) -> Option<UploadSummary> {
        self.session().summary.clone()
    }

    pub fn trigger_enabled(&self) -> bool {
        !self.session().phase.is_in_flight()
    }

    pub fn selected_file_name(&self) -> Option<String> {
        self.session()
            .selected
            .as_ref()
            .map(|file| file.name.clone())
    }

    /// Never held across an await point.
    fn session(&self) -> MutexGuard<'_, UploadSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        &self,
    ) -> Result<(AttemptGuard<'_>, Arc<SelectedFile>, CancellationToken), UploadError> {
        let mut session = self.session();
        if session.phase.is_in_flight() {
            warn!(phase = ?session.phase, "upload trigger ignored while an upload is in flight");
            return Err(UploadError::UploadInFlight);
        }
        let Some(file) = session.selected.clone() else {
            session.status = UploadStatus::MissingSelection;
            self.emit(ClientEvent::StatusChanged(UploadStatus::MissingSelection));
            return Err(UploadError::NoFileSelected);
        };

        let token = CancellationToken::new();
        session.cancel = Some(token.clone());
        session.phase = UploadPhase::Preparing;
        session.status = UploadStatus::Preparing;
        self.emit(ClientEvent::TriggerChanged { enabled: false });
        self.emit(ClientEvent::PhaseChanged(UploadPhase::Preparing));
        self.emit(ClientEvent::StatusChanged(UploadStatus::Preparing));
        let attempt = AttemptGuard {
            orchestrator: self,
            terminal: None,
        };
        Ok((attempt, file, token))
    }

    async fn run_phases(
        &self,
        file: &SelectedFile,
        token: &CancellationToken,
    ) -> Result<UploadCredential, UploadError> {
        self.set_phase(UploadPhase::RequestingCredential);
        info!(file = %file.name, "requesting upload credential");
        let credential = self
            .bounded(
                "credential request",
                self.timeout,
                token,
                self.backend
                    .request_credential(&file.name, &file.content_type),
            )
            .await?;

        {
            let mut session = self.session();
            session.phase = UploadPhase::Transferring;
            session.status = UploadStatus::Transferring;
            self.emit(ClientEvent::PhaseChanged(UploadPhase::Transferring));
            self.emit(ClientEvent::StatusChanged(UploadStatus::Transferring));
        }
        info!(file = %file.name, bytes = file.content.len(), "transferring file to storage");
        // No total deadline: a large body may legitimately take long. The
        // backend bounds stalls instead.
        self.bounded(
            "storage transfer",
            None,
            token,
            self.backend.put_object(
                &credential.upload_url,
                &file.content_type,
                file.content.clone(),
            ),
        )
        .await?;

        Ok(credential)
    }

    async fn bounded<T>(
        &self,
        phase: &'static str,
        limit: Option<Duration>,
        token: &CancellationToken,
        request: impl Future<Output = Result<T, UploadError>>,
    ) -> Result<T, UploadError> {
        let limited = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, request).await {
                    Ok(result) => result,
                    Err(_) => Err(UploadError::TimedOut { phase }),
                },
                None => request.await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(UploadError::Cancelled),
            result = limited => result,
        }
    }

    fn set_phase(&self, phase: UploadPhase) {
        self.session().phase = phase;
        self.emit(ClientEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
