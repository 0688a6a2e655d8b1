//! Run history
//!
//! One entry per applied recipe per cycle, appended whatever the verdict.
//! The engine only ever appends; the log is training data for the external
//! confidence model.

use crate::error::{LedgerError, Result};
use crate::fsutil::{append_line, read_or_empty};
use crate::types::{CycleId, Outcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Measured effect of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDelta {
    pub issues_before: u32,
    pub issues_after: u32,
    pub files_changed: u32,
    /// `None` when the cycle ended before the build ran
    pub build_passed: Option<bool>,
}

impl MetricsDelta {
    /// Issues removed (negative on regression)
    #[inline]
    #[must_use]
    pub fn issues_fixed(&self) -> i64 {
        i64::from(self.issues_before) - i64::from(self.issues_after)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub cycle_id: CycleId,
    pub recipe_id: String,
    pub outcome: Outcome,
    pub metrics_delta: MetricsDelta,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only run history
pub trait RunHistory: Send + Sync {
    /// Append entries in order
    ///
    /// # Errors
    /// Returns error if the entries cannot be persisted
    fn append(&self, entries: &[RunHistoryEntry]) -> Result<()>;

    /// All entries, oldest first
    ///
    /// # Errors
    /// Returns error if the history cannot be read
    fn entries(&self) -> Result<Vec<RunHistoryEntry>>;
}

/// Run history in a JSONL file
#[derive(Debug, Clone)]
pub struct FileRunHistory {
    path: PathBuf,
}

impl FileRunHistory {
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RunHistory for FileRunHistory {
    fn append(&self, entries: &[RunHistoryEntry]) -> Result<()> {
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(|e| LedgerError::serde(&self.path, e))?;
            append_line(&self.path, &line)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<RunHistoryEntry>> {
        let bytes = read_or_empty(&self.path)?;
        let text = String::from_utf8_lossy(&bytes);
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| LedgerError::serde(&self.path, e)))
            .collect()
    }
}

/// In-memory run history
#[derive(Debug, Default)]
pub struct MemoryRunHistory {
    entries: Mutex<Vec<RunHistoryEntry>>,
}

impl MemoryRunHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunHistory for MemoryRunHistory {
    fn append(&self, entries: &[RunHistoryEntry]) -> Result<()> {
        self.entries.lock().extend_from_slice(entries);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<RunHistoryEntry>> {
        Ok(self.entries.lock().clone())
    }
}
