//! External collaborators: the analyzer and the build
//!
//! Both are async traits so the controller can put a deadline on them. The
//! command-backed implementations run in the workspace root with
//! `kill_on_drop`, so a timed-out tool does not outlive its cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remedy_recipe::{Issue, Severity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Output of one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub tool: String,
    pub issues: Vec<Issue>,
}

impl AnalysisReport {
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>, issues: Vec<Issue>) -> Self {
        Self {
            generated_at,
            tool: String::new(),
            issues,
        }
    }

    /// Number of findings
    #[must_use]
    pub fn issue_count(&self) -> u32 {
        u32::try_from(self.issues.len()).unwrap_or(u32::MAX)
    }

    /// Sum of severity weights
    #[must_use]
    pub fn severity_weight(&self) -> u32 {
        self.issues.iter().map(|i| i.severity.weight()).sum()
    }

    /// Findings at `severity`
    #[must_use]
    pub fn count_at(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Age of the report at `now`, in whole seconds
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.generated_at).num_seconds()
    }
}

/// Result of one build run; only the exit status is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

/// Collaborator failures
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Report file does not exist
    #[error("report {} not found", path.display())]
    ReportMissing { path: PathBuf },

    /// I/O failure reading a report
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Report is not valid JSON of the expected shape
    #[error("malformed report from {origin}: {source}")]
    Malformed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// Command could not be started
    #[error("cannot run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command ran but produced no usable output
    #[error("'{command}' exited with {code:?} and no parseable report")]
    CommandFailed { command: String, code: Option<i32> },
}

/// Static-analysis collaborator
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `workspace`
    ///
    /// # Errors
    /// Returns error if no report can be produced
    async fn analyze(&self, workspace: &Path) -> Result<AnalysisReport, CollaboratorError>;
}

/// Build collaborator
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Build `workspace`
    ///
    /// # Errors
    /// Returns error only if the build could not be run at all; a failing
    /// build is `Ok` with `passed == false`
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, CollaboratorError>;
}

/// Program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// From an argv vector; `None` if empty
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Split a command line on whitespace
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        Self::from_argv(&argv)
    }

    fn command(&self, workspace: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(workspace).kill_on_drop(true);
        cmd
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Reads a JSON report written by an external analyzer
#[derive(Debug, Clone)]
pub struct ReportFileAnalyzer {
    path: PathBuf,
}

impl ReportFileAnalyzer {
    /// `path` is resolved against the workspace when relative
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Analyzer for ReportFileAnalyzer {
    async fn analyze(&self, workspace: &Path) -> Result<AnalysisReport, CollaboratorError> {
        let path = workspace.join(&self.path);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollaboratorError::ReportMissing { path })
            }
            Err(source) => return Err(CollaboratorError::Io { path, source }),
        };
        let report: AnalysisReport =
            serde_json::from_slice(&bytes).map_err(|source| CollaboratorError::Malformed {
                origin: path.display().to_string(),
                source,
            })?;
        tracing::debug!(
            report = %path.display(),
            issues = report.issues.len(),
            "analysis report loaded"
        );
        Ok(report)
    }
}

/// Runs an analyzer that prints its report on stdout
///
/// Analyzers commonly exit non-zero when they find issues, so the exit code
/// is ignored whenever stdout parses.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    spec: CommandSpec,
}

impl CommandAnalyzer {
    #[inline]
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, workspace: &Path) -> Result<AnalysisReport, CollaboratorError> {
        let output = self
            .spec
            .command(workspace)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| CollaboratorError::Spawn {
                command: self.spec.to_string(),
                source,
            })?;
        match serde_json::from_slice::<AnalysisReport>(&output.stdout) {
            Ok(report) => Ok(report),
            Err(_) if !output.status.success() => Err(CollaboratorError::CommandFailed {
                command: self.spec.to_string(),
                code: output.status.code(),
            }),
            Err(source) => Err(CollaboratorError::Malformed {
                origin: self.spec.to_string(),
                source,
            }),
        }
    }
}

/// Runs the workspace's build command
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    spec: CommandSpec,
}

impl CommandBuildRunner {
    #[inline]
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, CollaboratorError> {
        let started = Instant::now();
        let status = self
            .spec
            .command(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| CollaboratorError::Spawn {
                command: self.spec.to_string(),
                source,
            })?;
        let outcome = BuildOutcome {
            passed: status.success(),
            exit_code: status.code(),
            duration: started.elapsed(),
        };
        tracing::info!(
            command = %self.spec,
            passed = outcome.passed,
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.duration.as_millis() as u64,
            "build finished"
        );
        Ok(outcome)
    }
}
