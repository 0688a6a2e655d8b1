//! Cycle controller
//!
//! [`CycleController::run_cycle`] is the engine's single entry point. It takes
//! the workspace lock, then drives one [`Cycle`] through the phases:
//!
//! - **Observe**: obtain the analysis report; missing or stale input is
//!   fatal and nothing is touched.
//! - **Decide**: select actions; an empty selection ends the cycle as `noop`.
//! - **Act**: generate every patch, snapshot, then write.
//! - **Verify**: re-analyze and build.
//! - **Learn**: update trust, append history, attest.
//!
//! Any error once Act has begun goes through restore before it is reported,
//! and the cycle ends `RolledBack`. Only a failed restore or an unwritable
//! ledger surfaces as `Err`; every other cycle returns a [`CycleResult`].
//! A failed restore is still learned from and attested first.

use crate::applier::{ActionApplier, AppliedPatch};
use crate::collaborators::{
    AnalysisReport, Analyzer, BuildRunner, CommandAnalyzer, CommandBuildRunner, CommandSpec,
    ReportFileAnalyzer,
};
use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionEngine};
use crate::error::{ConfigError, EngineError, ErrorKind};
use crate::learner::{LearningUpdater, RecipeOutcome};
use crate::scoring::{ConfidenceScorer, HeuristicScorer};
use crate::state_machine::{CyclePhase, Deadline, PhaseMachine};
use crate::verifier::{VerifyResult, Verifier};
use chrono::{DateTime, Utc};
use remedy_artifact::{Sha256Digest, WorkspacePath};
use remedy_ledger::{
    AttestationDraft, AttestationLog, CycleId, FileAttestationLog, FileRunHistory,
    FileTrustStore, FsSnapshotStore, LedgerError, MetricsDelta, Outcome, RestoreReport,
    RunHistory, SnapshotStore, StateLayout, TrustStore, Verdict, WorkspaceLock,
};
use remedy_recipe::{Issue, RecipeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Terminal report of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub cycle_id: CycleId,
    /// `Done` or `RolledBack`
    pub phase: CyclePhase,
    pub verdict: Verdict,
    pub files_changed: Vec<WorkspacePath>,
    pub issues_before: u32,
    pub issues_after: u32,
    pub recipes_applied: Vec<String>,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub attestation_hash: Sha256Digest,
    /// Snapshot taken before the first write, if any
    pub snapshot: Option<CycleId>,
}

impl CycleResult {
    /// Process exit code: 1 on failure or rollback, else 0
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.verdict == Verdict::Failure || self.phase == CyclePhase::RolledBack {
            1
        } else {
            0
        }
    }
}

/// One in-flight remediation cycle
///
/// Created at cycle start, mutated only by the controller, terminal once
/// `Done` or `RolledBack`.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub id: CycleId,
    pub started_at: DateTime<Utc>,
    machine: PhaseMachine,
    pub selected_recipes: Vec<String>,
    pub touched_files: Vec<WorkspacePath>,
    pub snapshot: Option<CycleId>,
    pub verdict: Option<Verdict>,
    applied: Vec<AppliedPatch>,
}

impl Cycle {
    #[must_use]
    pub fn new(id: CycleId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            machine: PhaseMachine::new(),
            selected_recipes: Vec::new(),
            touched_files: Vec::new(),
            snapshot: None,
            verdict: None,
            applied: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.machine.current()
    }

    /// Phases entered so far
    #[inline]
    #[must_use]
    pub fn visited(&self) -> &[CyclePhase] {
        self.machine.visited()
    }

    fn advance(&mut self, to: CyclePhase) -> Result<(), EngineError> {
        self.machine.advance(to)
    }
}

/// Drives remediation cycles over one workspace
pub struct CycleController {
    workspace: PathBuf,
    config: EngineConfig,
    layout: StateLayout,
    registry: RecipeRegistry,
    scorer: Arc<dyn ConfidenceScorer>,
    analyzer: Arc<dyn Analyzer>,
    build: Arc<dyn BuildRunner>,
    snapshots: Arc<dyn SnapshotStore>,
    /// `None` opens the trust file once the lock is held
    trust: Option<Arc<dyn TrustStore>>,
    attestations: Arc<dyn AttestationLog>,
    history: Arc<dyn RunHistory>,
}

impl std::fmt::Debug for CycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleController")
            .field("workspace", &self.workspace)
            .field("config", &self.config)
            .field("recipes", &self.registry.ids())
            .field("scorer", &self.scorer)
            .finish_non_exhaustive()
    }
}

impl CycleController {
    /// Controller over `workspace` with collaborators taken from `config`
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid or names no
    /// build command
    pub fn open(workspace: impl Into<PathBuf>, config: EngineConfig) -> Result<Self, EngineError> {
        let command = config.analysis.command.as_deref().and_then(CommandSpec::from_argv);
        let analyzer: Arc<dyn Analyzer> = match command {
            Some(spec) => Arc::new(CommandAnalyzer::new(spec)),
            None => Arc::new(ReportFileAnalyzer::new(config.analysis.report_path.clone())),
        };
        let build = config
            .build
            .command
            .as_deref()
            .and_then(CommandSpec::from_argv)
            .ok_or_else(|| ConfigError::Invalid {
                field: "build.command",
                reason: "a build command is required to verify changes".to_string(),
            })?;
        Self::with_collaborators(
            workspace,
            config,
            analyzer,
            Arc::new(CommandBuildRunner::new(build)),
        )
    }

    /// Controller with explicit analyzer and build collaborators and
    /// file-backed stores under the state directory
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid
    pub fn with_collaborators(
        workspace: impl Into<PathBuf>,
        config: EngineConfig,
        analyzer: Arc<dyn Analyzer>,
        build: Arc<dyn BuildRunner>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let workspace = workspace.into();
        let layout = StateLayout::new(&workspace, &config.state_dir);
        let registry = config.build_registry()?;
        Ok(Self {
            snapshots: Arc::new(FsSnapshotStore::new(layout.snapshot_dir())),
            trust: None,
            attestations: Arc::new(FileAttestationLog::new(layout.attestation_file())),
            history: Arc::new(FileRunHistory::new(layout.history_file())),
            scorer: Arc::new(HeuristicScorer::default()),
            workspace,
            config,
            layout,
            registry,
            analyzer,
            build,
        })
    }

    /// Replace the recipe registry
    #[must_use]
    pub fn with_registry(mut self, registry: RecipeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the confidence scorer
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = store;
        self
    }

    #[must_use]
    pub fn with_trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.trust = Some(store);
        self
    }

    #[must_use]
    pub fn with_attestation_log(mut self, log: Arc<dyn AttestationLog>) -> Self {
        self.attestations = log;
        self
    }

    #[must_use]
    pub fn with_run_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = history;
        self
    }

    #[inline]
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &RecipeRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn snapshot_store(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn attestation_log(&self) -> &dyn AttestationLog {
        self.attestations.as_ref()
    }

    /// The trust store, opening the trust file if none was injected
    ///
    /// # Errors
    /// Returns error if the trust file exists but cannot be read
    pub fn trust_store(&self) -> Result<Arc<dyn TrustStore>, EngineError> {
        match &self.trust {
            Some(store) => Ok(Arc::clone(store)),
            None => Ok(Arc::new(FileTrustStore::open(self.layout.trust_file())?)),
        }
    }

    fn lock(&self) -> Result<WorkspaceLock, EngineError> {
        let wait = Duration::from_millis(self.config.lock_wait_ms);
        Ok(WorkspaceLock::acquire(&self.layout.lock_file(), wait)?)
    }

    /// Undo a cycle by hand: `snapshot`, or the newest one
    ///
    /// Files changed since the cycle are left alone and listed in the
    /// report as drifted.
    ///
    /// # Errors
    /// Returns error if the workspace is locked or the snapshot is missing
    /// or corrupt
    pub fn restore(&self, snapshot: Option<CycleId>) -> Result<RestoreReport, EngineError> {
        let _lock = self.lock()?;
        let report = match snapshot {
            Some(id) => self.snapshots.restore(id, &self.workspace)?,
            None => self.snapshots.restore_latest(&self.workspace)?,
        };
        Ok(report)
    }

    /// Run one full cycle
    ///
    /// # Errors
    /// Returns error when no cycle could run (lock held, input missing or
    /// stale, Observe/Decide timeout), when restore after a failed Act or
    /// Verify did not complete, or when trust, history or attestation cannot
    /// be persisted
    pub async fn run_cycle(&self) -> Result<CycleResult, EngineError> {
        let cycle = Cycle::new(CycleId::new(), Utc::now());
        let span = tracing::info_span!("cycle", cycle_id = %cycle.id);
        async move {
            let result = self.drive(cycle).await;
            match &result {
                Ok(r) => {
                    metrics::counter!("remedy_cycles_total", "verdict" => r.verdict.as_str())
                        .increment(1);
                    tracing::info!(
                        verdict = %r.verdict,
                        phase = %r.phase,
                        files = r.files_changed.len(),
                        issues_before = r.issues_before,
                        issues_after = r.issues_after,
                        "cycle finished"
                    );
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(error = %err, kind = %err.kind(), "cycle aborted")
                }
                Err(err) => tracing::warn!(error = %err, kind = %err.kind(), "cycle aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, mut cycle: Cycle) -> Result<CycleResult, EngineError> {
        let _lock = self.lock()?;

        // Observe
        let baseline = self.observe().await?;
        let trust = self.trust_store()?;
        for id in self.registry.ids() {
            trust.ensure(id)?;
        }

        // Decide
        cycle.advance(CyclePhase::Decide)?;
        let decision = self.decide(&baseline, trust.as_ref())?;
        if decision.is_empty() {
            return self.finish_noop(cycle, &baseline);
        }
        cycle.selected_recipes = decision.recipe_ids();

        // Act, Verify
        cycle.advance(CyclePhase::Act)?;
        match self.act_and_verify(&mut cycle, &decision, &baseline).await {
            Ok(verify) => match verify.failure() {
                None => self.finish_learned(cycle, &baseline, &verify, trust.as_ref()),
                Some(err) => self.roll_back(cycle, &baseline, Some(&verify), err, trust.as_ref()),
            },
            Err(err) => self.roll_back(cycle, &baseline, None, err, trust.as_ref()),
        }
    }

    async fn observe(&self) -> Result<AnalysisReport, EngineError> {
        let analysis = self.analyzer.analyze(&self.workspace);
        let report = match self.config.phase_timeouts.deadline(CyclePhase::Observe) {
            Some(limit) => tokio::time::timeout(limit, analysis)
                .await
                .map_err(|_| EngineError::Timeout {
                    phase: CyclePhase::Observe,
                    secs: limit.as_secs(),
                })?,
            None => analysis.await,
        }
        .map_err(|e| EngineError::InputMissing { reason: e.to_string() })?;

        let age_secs = report.age_secs(Utc::now());
        let max_secs = self.config.max_input_age_secs;
        if age_secs > i64::try_from(max_secs).unwrap_or(i64::MAX) {
            return Err(EngineError::InputStale { age_secs, max_secs });
        }
        if age_secs < 0 {
            tracing::warn!(age_secs, "analysis report is dated in the future");
        }
        tracing::info!(
            issues = report.issues.len(),
            eligible = report.issues.iter().filter(|i| i.handoff_eligible).count(),
            age_secs,
            tool = %report.tool,
            "analysis observed"
        );
        Ok(report)
    }

    fn decide(
        &self,
        baseline: &AnalysisReport,
        trust: &dyn TrustStore,
    ) -> Result<Decision, EngineError> {
        let started = Instant::now();
        let table = trust.all()?;
        let sizes = file_sizes(&self.workspace, &baseline.issues);
        let engine = DecisionEngine::new(&self.registry, self.scorer.as_ref(), &self.config);
        let decision = engine.decide(&baseline.issues, &table, &sizes);
        if let Some(limit) = self.config.phase_timeouts.deadline(CyclePhase::Decide) {
            if started.elapsed() > limit {
                return Err(EngineError::Timeout {
                    phase: CyclePhase::Decide,
                    secs: limit.as_secs(),
                });
            }
        }
        Ok(decision)
    }

    async fn act_and_verify(
        &self,
        cycle: &mut Cycle,
        decision: &Decision,
        baseline: &AnalysisReport,
    ) -> Result<VerifyResult, EngineError> {
        let deadline = self
            .config
            .phase_timeouts
            .deadline(CyclePhase::Act)
            .map(|limit| Deadline::after(CyclePhase::Act, limit));
        let applier = ActionApplier::new(&self.registry, &self.workspace, &self.config);

        let batch = applier.prepare(&decision.selected, deadline)?;
        cycle.selected_recipes = batch.recipe_ids();
        cycle.touched_files = batch.files().iter().map(|f| f.file.clone()).collect();

        let snapshot = self.snapshots.snapshot(
            cycle.id,
            &batch.captures(),
            &self.config.snapshot_retention,
            Utc::now(),
        )?;
        cycle.snapshot = Some(snapshot);
        if let Some(deadline) = deadline {
            deadline.check()?;
        }

        let written = applier.write_into(&batch, deadline, &mut cycle.applied);
        metrics::counter!("remedy_patches_applied_total").increment(cycle.applied.len() as u64);
        written?;

        cycle.advance(CyclePhase::Verify)?;
        let verifier = Verifier::new(
            self.analyzer.as_ref(),
            self.build.as_ref(),
            self.config.marginal_improvement,
        );
        verifier
            .verify(
                &self.workspace,
                baseline,
                self.config.phase_timeouts.deadline(CyclePhase::Verify),
            )
            .await
    }

    fn finish_noop(
        &self,
        mut cycle: Cycle,
        baseline: &AnalysisReport,
    ) -> Result<CycleResult, EngineError> {
        cycle.advance(CyclePhase::Done)?;
        cycle.verdict = Some(Verdict::Noop);
        let count = baseline.issue_count();
        let attestation = self.attest(&cycle, count, count, Verdict::Noop)?;
        let err = EngineError::NoApplicableRecipe;
        Ok(CycleResult {
            cycle_id: cycle.id,
            phase: cycle.phase(),
            verdict: Verdict::Noop,
            files_changed: Vec::new(),
            issues_before: count,
            issues_after: count,
            recipes_applied: Vec::new(),
            error: Some(err.kind()),
            error_message: Some(err.to_string()),
            attestation_hash: attestation,
            snapshot: None,
        })
    }

    fn finish_learned(
        &self,
        mut cycle: Cycle,
        baseline: &AnalysisReport,
        verify: &VerifyResult,
        trust: &dyn TrustStore,
    ) -> Result<CycleResult, EngineError> {
        cycle.advance(CyclePhase::Learn)?;
        cycle.verdict = Some(verify.verdict);
        let outcome = verify.verdict.outcome().unwrap_or(Outcome::Partial);
        let outcomes: Vec<RecipeOutcome> = cycle
            .selected_recipes
            .iter()
            .map(|id| RecipeOutcome::scored(id.clone(), outcome))
            .collect();
        self.learn(&cycle, &outcomes, baseline, Some(verify), trust)?;
        let attestation = self.attest(
            &cycle,
            verify.issues_before,
            verify.issues_after,
            verify.verdict,
        )?;
        cycle.advance(CyclePhase::Done)?;

        Ok(CycleResult {
            cycle_id: cycle.id,
            phase: cycle.phase(),
            verdict: verify.verdict,
            files_changed: cycle.applied.iter().map(|a| a.file.clone()).collect(),
            issues_before: verify.issues_before,
            issues_after: verify.issues_after,
            recipes_applied: cycle.selected_recipes.clone(),
            error: None,
            error_message: None,
            attestation_hash: attestation,
            snapshot: cycle.snapshot,
        })
    }

    fn roll_back(
        &self,
        mut cycle: Cycle,
        baseline: &AnalysisReport,
        verify: Option<&VerifyResult>,
        err: EngineError,
        trust: &dyn TrustStore,
    ) -> Result<CycleResult, EngineError> {
        tracing::warn!(
            error = %err,
            kind = %err.kind(),
            phase = %cycle.phase(),
            "rolling back cycle"
        );
        metrics::counter!("remedy_rollbacks_total").increment(1);

        // Learn and attest run even when restore falls short
        let unrestored = cycle.snapshot.and_then(|snapshot| self.restore_cycle(&cycle, snapshot));
        cycle.verdict = Some(Verdict::Failure);

        let outcomes: Vec<RecipeOutcome> = cycle
            .selected_recipes
            .iter()
            .map(|id| match &err {
                EngineError::PatchGeneration { recipe_id, .. } if recipe_id == id => {
                    RecipeOutcome::scored(id.clone(), Outcome::Failure)
                }
                e if e.penalizes_recipes() => RecipeOutcome::scored(id.clone(), Outcome::Failure),
                _ => RecipeOutcome::unscored(id.clone(), Outcome::Failure),
            })
            .collect();
        self.learn(&cycle, &outcomes, baseline, verify, trust)?;

        let issues_before = baseline.issue_count();
        let issues_after = verify.map_or(issues_before, |v| v.issues_after);
        let attestation = self.attest(&cycle, issues_before, issues_after, Verdict::Failure)?;
        if let Some(source) = unrestored {
            return Err(EngineError::RollbackFailed { source });
        }
        cycle.advance(CyclePhase::RolledBack)?;

        Ok(CycleResult {
            cycle_id: cycle.id,
            phase: cycle.phase(),
            verdict: Verdict::Failure,
            files_changed: cycle.applied.iter().map(|a| a.file.clone()).collect(),
            issues_before,
            issues_after,
            recipes_applied: cycle.selected_recipes.clone(),
            error: Some(err.kind()),
            error_message: Some(err.to_string()),
            attestation_hash: attestation,
            snapshot: cycle.snapshot,
        })
    }

    /// Restore `snapshot`; returns what kept the workspace from its
    /// pre-cycle state, if anything
    ///
    /// A drifted file the cycle never wrote holds someone else's edit and
    /// is left alone. A drifted file the cycle did write is a failed restore.
    fn restore_cycle(&self, cycle: &Cycle, snapshot: CycleId) -> Option<LedgerError> {
        let report = match self.snapshots.restore(snapshot, &self.workspace) {
            Ok(report) => report,
            Err(source) => {
                tracing::error!(
                    error = %source,
                    snapshot = %snapshot,
                    "restore failed; workspace needs manual attention"
                );
                return Some(source);
            }
        };
        tracing::info!(snapshot = %snapshot, restored = report.changed(), "workspace restored");

        let (lost, foreign): (Vec<&WorkspacePath>, Vec<&WorkspacePath>) = report
            .drifted()
            .partition(|path| cycle.applied.iter().any(|a| &a.file == *path));
        for path in foreign {
            tracing::warn!(file = %path, "file edited outside the engine was never written; kept");
        }
        if lost.is_empty() {
            return None;
        }
        tracing::error!(
            snapshot = %snapshot,
            files = ?lost,
            "rewritten files changed again before restore; workspace needs manual attention"
        );
        Some(LedgerError::WorkspaceDrift {
            snapshot,
            paths: lost.into_iter().cloned().collect(),
        })
    }

    fn learn(
        &self,
        cycle: &Cycle,
        outcomes: &[RecipeOutcome],
        baseline: &AnalysisReport,
        verify: Option<&VerifyResult>,
        trust: &dyn TrustStore,
    ) -> Result<(), EngineError> {
        let issues_before = baseline.issue_count();
        let delta = MetricsDelta {
            issues_before,
            issues_after: verify.map_or(issues_before, |v| v.issues_after),
            files_changed: u32::try_from(cycle.applied.len()).unwrap_or(u32::MAX),
            build_passed: verify.map(|v| v.build_passed),
        };
        LearningUpdater::new(trust, self.history.as_ref(), self.config.learning_rate).learn(
            cycle.id,
            outcomes,
            delta,
            Utc::now(),
        )?;
        Ok(())
    }

    fn attest(
        &self,
        cycle: &Cycle,
        issues_before: u32,
        issues_after: u32,
        verdict: Verdict,
    ) -> Result<Sha256Digest, EngineError> {
        let record = self.attestations.record(AttestationDraft {
            cycle_id: cycle.id,
            recorded_at: Utc::now(),
            issues_before,
            issues_after,
            recipes_applied: cycle.selected_recipes.clone(),
            files_changed: cycle.applied.iter().map(|a| a.file.clone()).collect(),
            verdict,
        })?;
        Ok(record.self_hash)
    }
}

/// Size in bytes of every file named by `issues`; unreadable files are skipped
fn file_sizes(workspace: &Path, issues: &[Issue]) -> BTreeMap<WorkspacePath, u64> {
    let mut sizes = BTreeMap::new();
    for issue in issues.iter().filter(|i| i.handoff_eligible) {
        if sizes.contains_key(&issue.file) {
            continue;
        }
        if let Ok(meta) = std::fs::metadata(issue.file.resolve(workspace)) {
            sizes.insert(issue.file.clone(), meta.len());
        }
    }
    sizes
}
