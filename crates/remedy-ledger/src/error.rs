//! Error types for the ledger

use crate::types::CycleId;
use remedy_artifact::{DiffError, PathError, Sha256Digest, WorkspacePath};
use std::path::PathBuf;

/// Ledger error
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// File system failure
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted state could not be encoded or decoded
    #[error("malformed state in {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot content does not match its recorded digest
    #[error("snapshot {id} integrity mismatch: expected {expected}, computed {actual}")]
    SnapshotIntegrityMismatch {
        id: CycleId,
        expected: Sha256Digest,
        actual: Sha256Digest,
    },

    /// Undo diff rebuilt different content than was captured
    #[error("snapshot {id} cannot rebuild {path}: {reason}")]
    UndoMismatch {
        id: CycleId,
        path: WorkspacePath,
        reason: String,
    },

    /// Snapshot does not exist
    #[error("snapshot {0} not found")]
    SnapshotNotFound(CycleId),

    /// Store holds no snapshots
    #[error("no snapshots recorded")]
    NoSnapshots,

    /// Files changed by someone else since the snapshot was taken
    #[error("snapshot {snapshot}: {} changed outside the engine", join_paths(paths))]
    WorkspaceDrift {
        snapshot: CycleId,
        paths: Vec<WorkspacePath>,
    },

    /// Attestation log fails verification
    #[error("attestation chain broken at line {line}: {reason}")]
    AttestationChainBroken { line: usize, reason: String },

    /// Another cycle holds the workspace lock
    #[error("workspace locked by another cycle ({})", path.display())]
    WorkspaceLocked { path: PathBuf },

    /// Diff could not be applied
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    /// Path error
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serde(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serde {
            path: path.into(),
            source,
        }
    }

    /// Stored data is corrupt or was tampered with
    #[inline]
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::SnapshotIntegrityMismatch { .. }
                | Self::UndoMismatch { .. }
                | Self::AttestationChainBroken { .. }
        )
    }
}

fn join_paths(paths: &[WorkspacePath]) -> String {
    paths
        .iter()
        .map(WorkspacePath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for ledger operations
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
