// History of successfully generated documents

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::HistoryError;

/// One finished generation: the prompt and the final HTML it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prompt: String,
    pub contract: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            contract: contract.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives finished documents. Fire-and-forget: implementations handle
/// their own failures.
#[cfg_attr(test, mockall::automock)]
pub trait HistorySink: Send + Sync {
    fn record(&self, entry: HistoryEntry);
}

/// JSON-file-backed history, one file per entry.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Open the store under the user's config directory.
    ///
    /// # Errors
    ///
    /// Fails when there is no config directory or it cannot be created.
    pub fn new() -> Result<Self, HistoryError> {
        let dir = dirs::config_dir()
            .ok_or(HistoryError::NoConfigDir)?
            .join("draftstream")
            .join("history");
        Self::at(dir)
    }

    /// Open the store in an explicit directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// # Errors
    ///
    /// Fails on serialization or write errors.
    pub fn save(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let content = serde_json::to_string_pretty(entry)?;
        fs::write(self.entry_path(&entry.id), content)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the entry is missing or unreadable.
    pub fn load(&self, id: &Uuid) -> Result<HistoryEntry, HistoryError> {
        let path = self.entry_path(id);
        if !path.exists() {
            return Err(HistoryError::NotFound(*id));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All entries, newest first. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the directory itself cannot be read.
    pub fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = Vec::new();

        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let parsed = fs::read_to_string(&path)
                    .map_err(HistoryError::from)
                    .and_then(|content| Ok(serde_json::from_str::<HistoryEntry>(&content)?));
                match parsed {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping history file"),
                }
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// # Errors
    ///
    /// Fails when an existing file cannot be removed.
    pub fn delete(&self, id: &Uuid) -> Result<(), HistoryError> {
        let path = self.entry_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl HistorySink for HistoryStore {
    fn record(&self, entry: HistoryEntry) {
        match self.save(&entry) {
            Ok(()) => debug!(id = %entry.id, len = entry.contract.len(), "history entry saved"),
            Err(e) => warn!(id = %entry.id, error = %e, "failed to save history entry"),
        }
    }
}
