// Error types for the streaming client

use std::path::PathBuf;

use thiserror::Error;

use crate::export::ExportFormat;

/// Rejections raised before a generate request ever reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Prompt cannot be empty")]
    Empty,
    #[error("Prompt is too short. Please provide more details about your contract needs.")]
    TooShort,
    #[error("Prompt is too long. Please limit to {max} characters.")]
    TooLong { max: usize },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Nothing to export: the document is empty")]
    EmptyDocument,
    #[error("Export format {0} is not supported by this exporter")]
    UnsupportedFormat(ExportFormat),
    #[error("Failed to write export file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("History entry not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("History I/O failed")]
    Io(#[from] std::io::Error),
    #[error("History entry is not valid JSON")]
    Json(#[from] serde_json::Error),
}
