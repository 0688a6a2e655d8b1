//! Error types for the remedy engine
//!
//! [`EngineError`] carries the detail; [`ErrorKind`] is the stable,
//! serializable taxonomy reported in every cycle result:
//! - `InputStaleOrMissing`: fatal, nothing mutated
//! - `NoApplicableRecipe`: clean no-op
//! - `PatchGenerationFailed`, `BuildFailedAfterApply`, `RegressionDetected`:
//!   routed through restore
//! - `SnapshotIntegrityMismatch`, `AttestationChainBroken`: integrity
//!   findings, surfaced loudly and never repaired

use crate::state_machine::CyclePhase;
use remedy_artifact::WorkspacePath;
use remedy_ledger::LedgerError;
use remedy_recipe::PatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Serializable error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InputStaleOrMissing,
    NoApplicableRecipe,
    PatchGenerationFailed,
    BudgetExceeded,
    BuildFailedAfterApply,
    RegressionDetected,
    SnapshotIntegrityMismatch,
    AttestationChainBroken,
    WorkspaceDrift,
    WorkspaceLocked,
    AnalyzerFailed,
    Timeout,
    IllegalTransition,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No analysis input could be obtained
    #[error("analysis input missing: {reason}; run the analyzer first")]
    InputMissing { reason: String },

    /// Analysis input is older than allowed
    #[error("analysis input is {age_secs}s old (limit {max_secs}s); run the analyzer again")]
    InputStale { age_secs: i64, max_secs: u64 },

    /// Decide found nothing worth doing
    #[error("no recipe cleared the trust threshold")]
    NoApplicableRecipe,

    /// A recipe could not produce its patch
    #[error("recipe '{recipe_id}' failed on issue '{issue_id}': {source}")]
    PatchGeneration {
        recipe_id: String,
        issue_id: String,
        #[source]
        source: PatchError,
    },

    /// Generated patches change more lines than the budget allows
    #[error("{file}: {loc} changed lines exceeds the per-file budget of {limit}")]
    BudgetExceeded {
        file: WorkspacePath,
        loc: u32,
        limit: u32,
    },

    /// Build failed on the mutated tree
    #[error("build failed after apply (exit code {exit_code:?})")]
    BuildFailed { exit_code: Option<i32> },

    /// More issues after the cycle than before
    #[error("regression detected: {before} issues before, {after} after")]
    Regression { before: u32, after: u32 },

    /// File changed between patch generation and write
    #[error("{path} changed while the cycle was running")]
    FileChanged { path: WorkspacePath },

    /// External analyzer or build tool could not be run
    #[error("{tool} failed: {reason}")]
    Collaborator { tool: &'static str, reason: String },

    /// Phase deadline elapsed
    #[error("{phase} phase timed out after {secs}s")]
    Timeout { phase: CyclePhase, secs: u64 },

    /// State machine misuse
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: CyclePhase, to: CyclePhase },

    /// Restore after a failed cycle did not complete
    #[error("rollback of cycle failed: {source}")]
    RollbackFailed {
        #[source]
        source: LedgerError,
    },

    /// Workspace file I/O
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted-state failure
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Taxonomy entry for this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputMissing { .. } | Self::InputStale { .. } => ErrorKind::InputStaleOrMissing,
            Self::NoApplicableRecipe => ErrorKind::NoApplicableRecipe,
            Self::PatchGeneration { .. } => ErrorKind::PatchGenerationFailed,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::BuildFailed { .. } => ErrorKind::BuildFailedAfterApply,
            Self::Regression { .. } => ErrorKind::RegressionDetected,
            Self::FileChanged { .. } => ErrorKind::WorkspaceDrift,
            Self::Collaborator { .. } => ErrorKind::AnalyzerFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            Self::Config(_) => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::RollbackFailed { source } | Self::Ledger(source) => ledger_kind(source),
        }
    }

    /// Error means the caller must intervene before another cycle
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
            || matches!(
                self.kind(),
                ErrorKind::InputStaleOrMissing
                    | ErrorKind::SnapshotIntegrityMismatch
                    | ErrorKind::AttestationChainBroken
                    | ErrorKind::WorkspaceLocked
                    | ErrorKind::IllegalTransition
                    | ErrorKind::Config
            )
    }

    /// Error can only arise once Act has begun, so it is routed through restore
    #[inline]
    #[must_use]
    pub fn requires_rollback(&self) -> bool {
        match self {
            Self::PatchGeneration { .. }
            | Self::BudgetExceeded { .. }
            | Self::BuildFailed { .. }
            | Self::Regression { .. }
            | Self::FileChanged { .. } => true,
            Self::Timeout { phase, .. } => matches!(phase, CyclePhase::Act | CyclePhase::Verify),
            _ => false,
        }
    }

    /// Error is evidence against the recipes that were applied
    #[inline]
    #[must_use]
    pub fn penalizes_recipes(&self) -> bool {
        matches!(self, Self::BuildFailed { .. } | Self::Regression { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn ledger_kind(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::SnapshotIntegrityMismatch { .. } | LedgerError::UndoMismatch { .. } => {
            ErrorKind::SnapshotIntegrityMismatch
        }
        LedgerError::AttestationChainBroken { .. } => ErrorKind::AttestationChainBroken,
        LedgerError::WorkspaceDrift { .. } => ErrorKind::WorkspaceDrift,
        LedgerError::WorkspaceLocked { .. } => ErrorKind::WorkspaceLocked,
        _ => ErrorKind::Io,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the engine
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Field out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Configured recipe cannot be built
    #[error("invalid recipe: {0}")]
    Recipe(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            EngineError::InputStale { age_secs: 600, max_secs: 300 }.kind(),
            ErrorKind::InputStaleOrMissing
        );
        assert_eq!(
            EngineError::Regression { before: 1, after: 2 }.kind(),
            ErrorKind::RegressionDetected
        );
        let broken = EngineError::Ledger(LedgerError::AttestationChainBroken {
            line: 3,
            reason: "x".into(),
        });
        assert_eq!(broken.kind(), ErrorKind::AttestationChainBroken);
        assert!(broken.is_fatal());
    }

    #[test]
    fn only_build_and_regression_penalize() {
        assert!(EngineError::BuildFailed { exit_code: Some(1) }.penalizes_recipes());
        assert!(!EngineError::Timeout { phase: CyclePhase::Act, secs: 1 }.penalizes_recipes());
        assert!(!EngineError::Timeout { phase: CyclePhase::Act, secs: 1 }.is_fatal());
    }

    #[test]
    fn rollback_only_after_act_began() {
        assert!(EngineError::Timeout { phase: CyclePhase::Verify, secs: 1 }.requires_rollback());
        assert!(!EngineError::Timeout { phase: CyclePhase::Observe, secs: 1 }.requires_rollback());
        assert!(!EngineError::InputMissing { reason: "x".into() }.requires_rollback());
        assert!(!EngineError::NoApplicableRecipe.requires_rollback());
        assert!(EngineError::Regression { before: 1, after: 2 }.requires_rollback());
    }

    #[test]
    fn kind_serializes_by_name() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::SnapshotIntegrityMismatch).unwrap(),
            "\"SnapshotIntegrityMismatch\""
        );
    }
}
