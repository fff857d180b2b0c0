//! Observable client state changes, replacing direct page updates.

use std::fmt;

use shared::domain::{format_kib, FileRecord};

/// The single current upload status message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    NoFileSelected,
    Selected(String),
    MissingSelection,
    Preparing,
    Transferring,
    Succeeded,
    Failed(String),
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFileSelected => write!(f, "No file selected."),
            Self::Selected(name) => write!(f, "Selected file: {name}"),
            Self::MissingSelection => write!(f, "Error: please select a file first."),
            Self::Preparing => write!(f, "Preparing upload..."),
            Self::Transferring => write!(f, "Uploading file to storage..."),
            Self::Succeeded => write!(f, "Upload succeeded!"),
            Self::Failed(message) => write!(f, "Error occurred: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Preparing,
    RequestingCredential,
    Transferring,
    RefreshingList,
    Succeeded,
    Failed,
}

impl UploadPhase {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::RequestingCredential | Self::Transferring | Self::RefreshingList
        )
    }
}

/// Shown after a successful upload until the next selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub file_name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryView {
    pub name: String,
    pub size_kib: String,
}

impl From<&FileRecord> for FileEntryView {
    fn from(record: &FileRecord) -> Self {
        Self {
            name: record.original_filename.clone(),
            size_kib: format_kib(record.file_size),
        }
    }
}

/// The rendered file list; exactly one state is shown at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListView {
    #[default]
    Loading,
    Failed(String),
    Empty,
    Populated(Vec<FileEntryView>),
}

impl ListView {
    pub fn from_records(records: &[FileRecord]) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Populated(records.iter().map(FileEntryView::from).collect())
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Loading => vec!["Loading file list...".to_string()],
            Self::Failed(reason) => vec![format!("Failed to load file list: {reason}")],
            Self::Empty => vec!["No files have been uploaded.".to_string()],
            Self::Populated(entries) => entries
                .iter()
                .map(|entry| format!("File name: {} ({} KB)", entry.name, entry.size_kib))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    StatusChanged(UploadStatus),
    PhaseChanged(UploadPhase),
    TriggerChanged { enabled: bool },
    SummaryChanged(Option<UploadSummary>),
    ListRendered(ListView),
}
