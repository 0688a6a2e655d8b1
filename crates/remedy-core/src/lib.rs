//! Remedy Core
//!
//! The remediation engine. One call to [`CycleController::run_cycle`] takes a
//! workspace through a single bounded, reversible cycle:
//!
//! ```text
//! Observe → Decide → Act → Verify → Learn → Done
//!             │       │       │
//!             └→ Done └───────┴→ RolledBack
//! ```
//!
//! # Guarantees
//!
//! - Nothing is written before every patch of the cycle has been generated
//!   and a snapshot of each target file is durable.
//! - A cycle touches at most `max_files` files and `max_loc_per_file`
//!   changed lines per file.
//! - A failed build, a regression, or any error after Act began restores
//!   the workspace byte for byte.
//! - Every completed cycle appends one hash-linked attestation record.
//!
//! # Example
//!
//! ```rust,no_run
//! use remedy_core::{CycleController, EngineConfig};
//!
//! # async fn run() -> Result<(), remedy_core::EngineError> {
//! let workspace = std::path::Path::new(".");
//! let config = EngineConfig::load(workspace)?.with_build_command(vec!["make".into()]);
//! let controller = CycleController::open(workspace, config)?;
//!
//! let result = controller.run_cycle().await?;
//! println!("{} ({} files)", result.verdict, result.files_changed.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod applier;
pub mod budget;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod learner;
pub mod scoring;
pub mod state_machine;
pub mod verifier;

pub use applier::{ActionApplier, AppliedPatch, PreparedBatch, PreparedFile};
pub use budget::{apply_budget, BudgetGuard, BudgetLimits, BudgetRejection};
pub use collaborators::{
    AnalysisReport, Analyzer, BuildOutcome, BuildRunner, CollaboratorError, CommandAnalyzer,
    CommandBuildRunner, CommandSpec, ReportFileAnalyzer,
};
pub use config::{EngineConfig, ParallelConfig, PhaseTimeouts, CONFIG_FILE};
pub use controller::{Cycle, CycleController, CycleResult};
pub use decision::{Decision, DecisionEngine, SelectedAction};
pub use error::{ConfigError, EngineError, ErrorKind};
pub use learner::{LearningUpdater, RecipeOutcome};
pub use scoring::{clamp_probability, ConfidenceScorer, FeatureVector, FixedScorer, HeuristicScorer};
pub use state_machine::{
    allowed_transitions, validate_transition, CyclePhase, Deadline, PhaseMachine,
};
pub use verifier::{judge, VerifyResult, Verifier};

pub use remedy_ledger::{CycleId, Outcome, Verdict};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
