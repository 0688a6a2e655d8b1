//! Remedy Ledger
//!
//! Everything the engine persists between cycles, under one state directory
//! inside the workspace:
//!
//! ```text
//! <workspace>/.remedy/
//!   cycle.lock           advisory lock held for the whole cycle
//!   trust.json           per-recipe trust scores
//!   attestations.jsonl   hash-linked cycle records
//!   history.jsonl        per-recipe run outcomes
//!   snapshots/<id>.json  undo data per cycle
//! ```
//!
//! Each store is a trait with a file-backed and an in-memory implementation,
//! so the cycle controller can run entirely against fakes in tests.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod attestation;
mod error;
mod fsutil;
mod history;
mod lock;
mod snapshot;
mod trust;
mod types;

pub use attestation::{
    check_chain, AttestationDraft, AttestationLog, AttestationRecord, FileAttestationLog,
    MemoryAttestationLog,
};
pub use error::{LedgerError, Result};
pub use fsutil::atomic_write;
pub use history::{FileRunHistory, MemoryRunHistory, MetricsDelta, RunHistory, RunHistoryEntry};
pub use lock::WorkspaceLock;
pub use snapshot::{
    restore_snapshot, FileCapture, FileRestore, FsSnapshotStore, MemorySnapshotStore,
    RestoreReport, RetentionPolicy, Snapshot, SnapshotEntry, SnapshotStore,
};
pub use trust::{FileTrustStore, MemoryTrustStore, TrustRecord, TrustStore, NEUTRAL_PRIOR};
pub use types::{CycleId, Outcome, Verdict};

use std::path::{Path, PathBuf};

/// File locations inside a state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Layout rooted at `workspace/state_dir`
    #[must_use]
    pub fn new(workspace: &Path, state_dir: &Path) -> Self {
        Self {
            root: workspace.join(state_dir),
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("cycle.lock")
    }

    #[must_use]
    pub fn trust_file(&self) -> PathBuf {
        self.root.join("trust.json")
    }

    #[must_use]
    pub fn attestation_file(&self) -> PathBuf {
        self.root.join("attestations.jsonl")
    }

    #[must_use]
    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
