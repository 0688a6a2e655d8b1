//! Testing utilities for the remedy workspace
//!
//! Shared fixtures: throwaway workspaces, issue builders, scripted
//! collaborators and in-memory ledger stores.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use remedy_artifact::WorkspacePath;
use remedy_core::{
    AnalysisReport, Analyzer, BuildOutcome, BuildRunner, CollaboratorError, CycleController,
};
use remedy_ledger::{MemoryAttestationLog, MemoryRunHistory, MemorySnapshotStore, MemoryTrustStore};
use remedy_recipe::{Issue, Severity};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Temporary workspace directory
#[derive(Debug)]
pub struct TempWorkspace {
    dir: tempfile::TempDir,
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `rel`, creating parents
    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).unwrap()
    }

    /// Write `report` where the default configuration looks for it
    pub fn write_report(&self, report: &AnalysisReport) -> &Self {
        let json = serde_json::to_string_pretty(report).unwrap();
        self.write(".remedy/analysis.json", &json)
    }

    /// Every file outside the state directory, by relative path
    pub fn tree(&self) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        collect(self.dir.path(), self.dir.path(), &mut out);
        out
    }

    /// Every path under the state directory, relative to it
    pub fn state_entries(&self) -> Vec<String> {
        let state = self.dir.path().join(".remedy");
        let mut out = BTreeMap::new();
        if state.exists() {
            collect_all(&state, &state, &mut out);
        }
        out.into_keys().collect()
    }
}

fn collect(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.file_name().is_some_and(|n| n == ".remedy") {
            continue;
        }
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            out.insert(rel, std::fs::read(&path).unwrap());
        }
    }
}

fn collect_all(root: &Path, dir: &Path, out: &mut BTreeMap<String, ()>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_all(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            out.insert(rel, ());
        }
    }
}

/// Eligible issue
pub fn issue(id: &str, file: &str, line: u32, category: &str) -> Issue {
    Issue::new(id, WorkspacePath::new(file).unwrap(), line, Severity::Medium, category).eligible()
}

/// Issue the analyzer did not hand off
pub fn ineligible_issue(id: &str, file: &str, line: u32, category: &str) -> Issue {
    Issue::new(id, WorkspacePath::new(file).unwrap(), line, Severity::Medium, category)
}

/// Report generated just now
pub fn fresh_report(issues: Vec<Issue>) -> AnalysisReport {
    AnalysisReport::new(Utc::now(), issues)
}

/// Report generated `age` ago
pub fn aged_report(issues: Vec<Issue>, age: Duration) -> AnalysisReport {
    let age = ChronoDuration::from_std(age).unwrap();
    AnalysisReport::new(Utc::now() - age, issues)
}

/// Report of `n` ineligible placeholder issues
pub fn filler_issues(prefix: &str, n: usize) -> Vec<Issue> {
    (0..n)
        .map(|i| ineligible_issue(&format!("{prefix}{i}"), "other.txt", 1, "style"))
        .collect()
}

/// Returns queued reports in order, then repeats the last one
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    reports: Mutex<VecDeque<AnalysisReport>>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(reports: Vec<AnalysisReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, _workspace: &Path) -> Result<AnalysisReport, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reports = self.reports.lock();
        let next = if reports.len() > 1 {
            reports.pop_front()
        } else {
            reports.front().cloned()
        };
        next.ok_or(CollaboratorError::ReportMissing {
            path: PathBuf::from("<scripted>"),
        })
    }
}

/// Reports one eligible `whitespace` issue per line ending in blanks
///
/// Scans `files` as they are on disk, so it sees the engine's edits.
#[derive(Debug, Clone)]
pub struct WhitespaceScanner {
    files: Vec<String>,
    extra: Vec<Issue>,
}

impl WhitespaceScanner {
    pub fn new(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| (*f).to_string()).collect(),
            extra: Vec::new(),
        }
    }

    /// Issues appended to every scan
    pub fn with_extra(mut self, issues: Vec<Issue>) -> Self {
        self.extra = issues;
        self
    }

    pub fn scan(&self, workspace: &Path) -> AnalysisReport {
        let mut issues = Vec::new();
        for file in &self.files {
            let text = std::fs::read_to_string(workspace.join(file)).unwrap_or_default();
            for (n, line) in text.lines().enumerate() {
                if line.ends_with([' ', '\t']) {
                    let line_no = u32::try_from(n + 1).unwrap();
                    issues.push(issue(&format!("{file}:{line_no}"), file, line_no, "whitespace"));
                }
            }
        }
        issues.extend(self.extra.iter().cloned());
        fresh_report(issues)
    }
}

#[async_trait]
impl Analyzer for WhitespaceScanner {
    async fn analyze(&self, workspace: &Path) -> Result<AnalysisReport, CollaboratorError> {
        Ok(self.scan(workspace))
    }
}

/// Build with a fixed result, optionally slow
#[derive(Debug)]
pub struct ScriptedBuild {
    passes: bool,
    delay: Duration,
    /// Workspace file the build overwrites, like a code generator would
    output: Option<(String, String)>,
    calls: AtomicUsize,
}

impl ScriptedBuild {
    pub fn passing() -> Self {
        Self {
            passes: true,
            delay: Duration::ZERO,
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Overwrite `rel` with `content` on every build
    pub fn writing(mut self, rel: &str, content: &str) -> Self {
        self.output = Some((rel.to_string(), content.to_string()));
        self
    }

    pub fn failing() -> Self {
        Self {
            passes: false,
            ..Self::passing()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuild {
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((rel, content)) = &self.output {
            std::fs::write(workspace.join(rel), content).unwrap();
        }
        Ok(BuildOutcome {
            passed: self.passes,
            exit_code: Some(if self.passes { 0 } else { 1 }),
            duration: self.delay,
        })
    }
}

/// In-memory ledger stores shared with a controller
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    pub trust: Arc<MemoryTrustStore>,
    pub history: Arc<MemoryRunHistory>,
    pub attestations: Arc<MemoryAttestationLog>,
    pub snapshots: Arc<MemorySnapshotStore>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `controller` at these stores
    pub fn attach(&self, controller: CycleController) -> CycleController {
        controller
            .with_trust_store(self.trust.clone())
            .with_run_history(self.history.clone())
            .with_attestation_log(self.attestations.clone())
            .with_snapshot_store(self.snapshots.clone())
    }
}
