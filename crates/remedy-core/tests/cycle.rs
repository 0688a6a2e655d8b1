//! End-to-end cycles against real temporary workspaces

use pretty_assertions::assert_eq;
use remedy_core::{
    CycleController, CyclePhase, EngineConfig, EngineError, ErrorKind, FixedScorer, Outcome,
    Verdict,
};
use remedy_ledger::{
    AttestationLog, CycleId, MemorySnapshotStore, RunHistory, Snapshot, SnapshotStore, TrustStore,
    NEUTRAL_PRIOR,
};
use remedy_recipe::{
    Issue, Patch, PatchError, Recipe, RecipeRegistry, TrailingWhitespaceRecipe, WorkingTree,
};
use remedy_test_utils::{
    aged_report, filler_issues, fresh_report, ineligible_issue, issue, MemoryLedger,
    ScriptedAnalyzer, ScriptedBuild, TempWorkspace, WhitespaceScanner,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const RECIPE: &str = "trailing-whitespace";

fn controller(
    ws: &TempWorkspace,
    config: EngineConfig,
    analyzer: impl remedy_core::Analyzer + 'static,
    build: ScriptedBuild,
) -> CycleController {
    CycleController::with_collaborators(ws.path(), config, Arc::new(analyzer), Arc::new(build))
        .unwrap()
        .with_scorer(Arc::new(FixedScorer(0.9)))
}

/// Eight files, each with one dirty line, plus two findings nobody handed off
fn eight_dirty_files(ws: &TempWorkspace) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (i, name) in ["a", "b", "c", "d", "e", "f", "g", "h"].iter().enumerate() {
        let file = format!("src/{name}.ts");
        ws.write(&file, "export const x = 1;   \nexport const y = 2;\n");
        issues.push(issue(&format!("w{i}"), &file, 1, "whitespace"));
    }
    issues.extend(filler_issues("style-", 2));
    issues
}

#[tokio::test]
async fn clean_cycle_fixes_within_budget_and_raises_trust() {
    let ws = TempWorkspace::new();
    let baseline = eight_dirty_files(&ws);
    assert_eq!(baseline.len(), 10);
    let after = baseline[3..8].to_vec();

    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default().with_max_files(3),
        ScriptedAnalyzer::new(vec![fresh_report(baseline), fresh_report(after)]),
        ScriptedBuild::passing(),
    ));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.verdict, Verdict::Success);
    assert_eq!(result.phase, CyclePhase::Done);
    assert_eq!(result.issues_before, 10);
    assert_eq!(result.issues_after, 5);
    assert_eq!(result.recipes_applied, vec![RECIPE.to_string()]);

    let mut changed: Vec<String> = result.files_changed.iter().map(ToString::to_string).collect();
    changed.sort();
    assert_eq!(changed, ["src/a.ts", "src/b.ts", "src/c.ts"]);
    assert_eq!(ws.read("src/a.ts"), "export const x = 1;\nexport const y = 2;\n");
    assert_eq!(ws.read("src/d.ts"), "export const x = 1;   \nexport const y = 2;\n");

    let trust = ledger.trust.get(RECIPE).unwrap();
    assert!(trust.score > NEUTRAL_PRIOR);
    assert_eq!(trust.successes, 1);
    assert!(ledger.attestations.verify_chain());
    assert_eq!(ledger.attestations.records().unwrap().len(), 1);
}

#[tokio::test]
async fn regression_restores_every_byte() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "one  \ntwo\n").write("b.ts", "three\t\nfour\n");
    let original = ws.tree();
    let baseline = vec![issue("1", "a.ts", 1, "whitespace"), issue("2", "b.ts", 1, "whitespace")];
    let worse = vec![
        ineligible_issue("x", "a.ts", 2, "style"),
        ineligible_issue("y", "b.ts", 2, "style"),
        ineligible_issue("z", "b.ts", 1, "style"),
    ];

    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default(),
        ScriptedAnalyzer::new(vec![fresh_report(baseline), fresh_report(worse)]),
        ScriptedBuild::passing(),
    ));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.phase, CyclePhase::RolledBack);
    assert_eq!(result.verdict, Verdict::Failure);
    assert_eq!(result.error, Some(ErrorKind::RegressionDetected));
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.files_changed.len(), 2);
    assert_eq!(ws.tree(), original);

    assert!(ledger.trust.get(RECIPE).unwrap().score < NEUTRAL_PRIOR);
    let history = ledger.history.entries().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, Outcome::Failure);
    assert_eq!(history[0].metrics_delta.issues_after, 3);
    assert_eq!(ledger.attestations.records().unwrap()[0].verdict, Verdict::Failure);
}

#[tokio::test]
async fn failing_build_restores_and_counts_against_recipes() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let original = ws.tree();
    let ledger = MemoryLedger::new();
    let build = ScriptedBuild::failing();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default(),
        WhitespaceScanner::new(&["a.ts"]),
        build,
    ));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.error, Some(ErrorKind::BuildFailedAfterApply));
    assert_eq!(ws.tree(), original);
    assert_eq!(ledger.trust.get(RECIPE).unwrap().failures, 1);
}

#[tokio::test]
async fn stale_input_touches_nothing() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let original = ws.tree();
    let report = aged_report(vec![issue("1", "a.ts", 1, "whitespace")], Duration::from_secs(600));
    ws.write_report(&report);

    let engine = CycleController::with_collaborators(
        ws.path(),
        EngineConfig::default(),
        Arc::new(remedy_core::ReportFileAnalyzer::new(".remedy/analysis.json")),
        Arc::new(ScriptedBuild::passing()),
    )
    .unwrap();

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, remedy_core::EngineError::InputStale { max_secs: 300, .. }));
    assert!(err.is_fatal());
    assert_eq!(ws.tree(), original);
    assert_eq!(ws.state_entries(), ["analysis.json", "cycle.lock"]);
}

#[tokio::test]
async fn missing_report_is_fatal() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let engine = CycleController::with_collaborators(
        ws.path(),
        EngineConfig::default(),
        Arc::new(remedy_core::ReportFileAnalyzer::new(".remedy/analysis.json")),
        Arc::new(ScriptedBuild::passing()),
    )
    .unwrap();

    let err = engine.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputStaleOrMissing);
    assert_eq!(ws.read("a.ts"), "x  \n");
}

#[tokio::test]
async fn manual_restore_is_idempotent() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "a  \nb\t\n").write("b.ts", "c \n");
    let original = ws.tree();

    // file-backed stores throughout
    let engine = controller(
        &ws,
        EngineConfig::default(),
        WhitespaceScanner::new(&["a.ts", "b.ts"]),
        ScriptedBuild::passing(),
    );
    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.verdict, Verdict::Success);
    assert_ne!(ws.tree(), original);

    let first = engine.restore(None).unwrap();
    assert_eq!(first.snapshot, result.cycle_id);
    assert_eq!(first.changed(), 2);
    assert_eq!(ws.tree(), original);

    let second = engine.restore(result.snapshot).unwrap();
    assert_eq!(second.changed(), 0);
    assert_eq!(ws.tree(), original);
}

#[tokio::test]
async fn trust_converges_under_repeated_success() {
    let ws = TempWorkspace::new();
    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default(),
        WhitespaceScanner::new(&["a.ts"]),
        ScriptedBuild::passing(),
    ));

    let mut last = NEUTRAL_PRIOR;
    for _ in 0..20 {
        ws.write("a.ts", "dirty  \n");
        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.verdict, Verdict::Success);
        let score = ledger.trust.get(RECIPE).unwrap().score;
        assert!(score > last && score <= 1.0);
        last = score;
    }
    // 1 - 0.5 * 0.9^20
    assert!((last - 0.939_211_4).abs() < 1e-6);
    assert_eq!(ledger.attestations.records().unwrap().len(), 20);
    assert!(ledger.attestations.verify_chain());
}

#[tokio::test]
async fn loc_budget_is_inclusive() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "1 \n2 \n3 \n4\n");
    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default().with_max_loc_per_file(2),
        WhitespaceScanner::new(&["a.ts"]),
        ScriptedBuild::passing(),
    ));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.verdict, Verdict::Success);
    assert_eq!((result.issues_before, result.issues_after), (3, 1));
    assert_eq!(ws.read("a.ts"), "1\n2\n3 \n4\n");
}

#[tokio::test]
async fn identical_inputs_make_identical_changes() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let ws = TempWorkspace::new();
        let baseline = eight_dirty_files(&ws);
        let engine = MemoryLedger::new().attach(controller(
            &ws,
            EngineConfig::default().with_max_files(4),
            ScriptedAnalyzer::new(vec![fresh_report(baseline), fresh_report(Vec::new())]),
            ScriptedBuild::passing(),
        ));
        let result = engine.run_cycle().await.unwrap();
        outcomes.push((result.recipes_applied, result.files_changed, ws.tree()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn nothing_eligible_is_noop() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let original = ws.tree();
    let ledger = MemoryLedger::new();
    let build = Arc::new(ScriptedBuild::passing());
    let engine = ledger.attach(
        CycleController::with_collaborators(
            ws.path(),
            EngineConfig::default(),
            Arc::new(ScriptedAnalyzer::new(vec![fresh_report(vec![ineligible_issue(
                "1",
                "a.ts",
                1,
                "whitespace",
            )])])),
            build.clone(),
        )
        .unwrap(),
    );

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.verdict, Verdict::Noop);
    assert_eq!(result.error, Some(ErrorKind::NoApplicableRecipe));
    assert_eq!(result.exit_code(), 0);
    assert_eq!(ws.tree(), original);
    assert_eq!(build.calls(), 0);
    assert_eq!(ledger.attestations.records().unwrap()[0].verdict, Verdict::Noop);
}

#[tokio::test]
async fn slow_verify_rolls_back_without_penalty() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let original = ws.tree();
    let mut config = EngineConfig::default();
    config.phase_timeouts.verify = 1;

    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        config,
        WhitespaceScanner::new(&["a.ts"]),
        ScriptedBuild::passing().with_delay(Duration::from_secs(30)),
    ));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.phase, CyclePhase::RolledBack);
    assert_eq!(result.error, Some(ErrorKind::Timeout));
    assert_eq!(ws.tree(), original);
    assert_eq!(ledger.trust.get(RECIPE).unwrap().score, NEUTRAL_PRIOR);
    assert_eq!(ledger.history.entries().unwrap()[0].outcome, Outcome::Failure);
}

#[tokio::test]
async fn attestation_chain_persists_across_controllers() {
    let ws = TempWorkspace::new();
    for _ in 0..3 {
        ws.write("a.ts", "x  \n");
        let engine = controller(
            &ws,
            EngineConfig::default(),
            WhitespaceScanner::new(&["a.ts"]),
            ScriptedBuild::passing(),
        );
        engine.run_cycle().await.unwrap();
    }

    let engine = controller(
        &ws,
        EngineConfig::default(),
        WhitespaceScanner::new(&["a.ts"]),
        ScriptedBuild::passing(),
    );
    let records = engine.attestation_log().records().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].prev_hash, records[0].self_hash);
    assert!(engine.attestation_log().verify_chain());

    let trust = engine.trust_store().unwrap().get(RECIPE).unwrap();
    assert_eq!(trust.successes, 3);
}

/// Snapshots into memory, then lets someone else edit a file
#[derive(Debug, Default)]
struct EditAfterSnapshot {
    inner: MemorySnapshotStore,
    file: PathBuf,
    content: &'static str,
}

impl SnapshotStore for EditAfterSnapshot {
    fn save(&self, snapshot: &Snapshot) -> remedy_ledger::Result<()> {
        self.inner.save(snapshot)?;
        std::fs::write(&self.file, self.content).unwrap();
        Ok(())
    }

    fn load(&self, id: CycleId) -> remedy_ledger::Result<Snapshot> {
        self.inner.load(id)
    }

    fn list(&self) -> remedy_ledger::Result<Vec<CycleId>> {
        self.inner.list()
    }

    fn remove(&self, id: CycleId) -> remedy_ledger::Result<()> {
        self.inner.remove(id)
    }
}

/// Trailing-whitespace fix that takes its time
#[derive(Debug)]
struct SlowWhitespace(Duration);

impl Recipe for SlowWhitespace {
    fn id(&self) -> &str {
        "slow-whitespace"
    }

    fn category(&self) -> &str {
        "whitespace"
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        issue.category == "whitespace"
    }

    fn generate_patch(&self, issue: &Issue, tree: &dyn WorkingTree) -> Result<Patch, PatchError> {
        std::thread::sleep(self.0);
        TrailingWhitespaceRecipe::new().generate_patch(issue, tree)
    }
}

#[tokio::test]
async fn build_rewriting_a_patched_file_fails_rollback_but_is_recorded() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "one  \n").write("b.ts", "two\t\n");
    let ledger = MemoryLedger::new();
    let engine = ledger.attach(controller(
        &ws,
        EngineConfig::default(),
        WhitespaceScanner::new(&["a.ts", "b.ts"]),
        ScriptedBuild::failing().writing("b.ts", "generated\n"),
    ));

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, EngineError::RollbackFailed { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::WorkspaceDrift);
    assert!(err.is_fatal());
    assert!(err.to_string().contains("b.ts"));

    // a.ts is back, b.ts keeps what the build wrote
    assert_eq!(ws.read("a.ts"), "one  \n");
    assert_eq!(ws.read("b.ts"), "generated\n");

    let history = ledger.history.entries().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, Outcome::Failure);
    assert_eq!(ledger.trust.get(RECIPE).unwrap().failures, 1);
    let records = ledger.attestations.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].verdict, Verdict::Failure);
    assert_eq!(records[0].files_changed.len(), 2);
}

#[tokio::test]
async fn edit_during_act_restores_written_files_and_keeps_the_edit() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "let a = 1;  \nlet b = 2;\n").write("b.ts", "let c = 3;\t\n");
    let ledger = MemoryLedger::new();
    let engine = ledger
        .attach(controller(
            &ws,
            EngineConfig::default(),
            WhitespaceScanner::new(&["a.ts", "b.ts"]),
            ScriptedBuild::passing(),
        ))
        .with_snapshot_store(Arc::new(EditAfterSnapshot {
            file: ws.path().join("b.ts"),
            content: "let c = 30;\n",
            ..EditAfterSnapshot::default()
        }));

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.phase, CyclePhase::RolledBack);
    assert_eq!(result.error, Some(ErrorKind::WorkspaceDrift));
    assert_eq!(result.exit_code(), 1);
    let changed: Vec<String> = result.files_changed.iter().map(ToString::to_string).collect();
    assert_eq!(changed, ["a.ts"]);

    assert_eq!(ws.read("a.ts"), "let a = 1;  \nlet b = 2;\n");
    assert_eq!(ws.read("b.ts"), "let c = 30;\n");

    // an outside edit says nothing about the recipe
    assert_eq!(ledger.trust.get(RECIPE).unwrap().score, NEUTRAL_PRIOR);
    assert_eq!(ledger.history.entries().unwrap()[0].outcome, Outcome::Failure);
    assert_eq!(ledger.attestations.records().unwrap()[0].verdict, Verdict::Failure);
}

#[tokio::test]
async fn failing_patch_generation_penalizes_only_that_recipe() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n").write("b.ts", "const y = 2;\n");
    let original = ws.tree();
    let baseline = vec![
        issue("1", "a.ts", 1, "whitespace"),
        // not a debug statement, so the recipe cannot remove it
        issue("2", "b.ts", 1, "debug-statement"),
    ];
    let ledger = MemoryLedger::new();
    let build = Arc::new(ScriptedBuild::passing());
    let engine = ledger.attach(
        CycleController::with_collaborators(
            ws.path(),
            EngineConfig::default(),
            Arc::new(ScriptedAnalyzer::new(vec![fresh_report(baseline)])),
            build.clone(),
        )
        .unwrap()
        .with_scorer(Arc::new(FixedScorer(0.9))),
    );

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.phase, CyclePhase::RolledBack);
    assert_eq!(result.error, Some(ErrorKind::PatchGenerationFailed));
    assert_eq!(result.snapshot, None);
    assert!(result.files_changed.is_empty());
    assert_eq!(ws.tree(), original);
    assert_eq!(build.calls(), 0);
    assert!(ledger.snapshots.list().unwrap().is_empty());

    let failed = ledger.trust.get("remove-debug-statement").unwrap();
    assert_eq!(failed.failures, 1);
    assert!(failed.score < NEUTRAL_PRIOR);
    assert_eq!(ledger.trust.get(RECIPE).unwrap().score, NEUTRAL_PRIOR);

    let mut history: Vec<(String, Outcome)> = ledger
        .history
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| (e.recipe_id, e.outcome))
        .collect();
    history.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        history,
        vec![
            ("remove-debug-statement".to_string(), Outcome::Failure),
            (RECIPE.to_string(), Outcome::Failure),
        ]
    );
    assert_eq!(ledger.attestations.records().unwrap()[0].verdict, Verdict::Failure);
}

#[tokio::test]
async fn act_timeout_rolls_back_without_penalty() {
    let ws = TempWorkspace::new();
    ws.write("a.ts", "x  \n");
    let original = ws.tree();
    let mut config = EngineConfig::default();
    config.phase_timeouts.act = 1;
    let mut registry = RecipeRegistry::new();
    registry
        .register(Arc::new(SlowWhitespace(Duration::from_millis(1_200))))
        .unwrap();

    let ledger = MemoryLedger::new();
    let engine = ledger.attach(
        controller(&ws, config, WhitespaceScanner::new(&["a.ts"]), ScriptedBuild::passing())
            .with_registry(registry),
    );

    let result = engine.run_cycle().await.unwrap();
    assert_eq!(result.phase, CyclePhase::RolledBack);
    assert_eq!(result.error, Some(ErrorKind::Timeout));
    assert!(result.error_message.unwrap().contains("act phase"));
    assert_eq!(ws.tree(), original);
    assert_eq!(ledger.trust.get("slow-whitespace").unwrap().score, NEUTRAL_PRIOR);
    assert_eq!(ledger.history.entries().unwrap()[0].outcome, Outcome::Failure);
}
