//! Verifier
//!
//! Re-analyzes the mutated tree, runs the build, and judges the cycle against
//! the baseline captured at Observe.

use crate::collaborators::{AnalysisReport, Analyzer, BuildRunner};
use crate::error::EngineError;
use crate::state_machine::CyclePhase;
use remedy_ledger::Verdict;
use std::path::Path;
use std::time::Duration;

/// Judge a cycle from issue counts and the build result
///
/// - `failure` if the build failed or there are more issues than before
/// - `success` if issues went down by more than `marginal` (a fraction of
///   the baseline)
/// - `partial` otherwise
#[must_use]
pub fn judge(issues_before: u32, issues_after: u32, build_passed: bool, marginal: f64) -> Verdict {
    if !build_passed || issues_after > issues_before {
        return Verdict::Failure;
    }
    if issues_after < issues_before {
        let improvement = f64::from(issues_before - issues_after) / f64::from(issues_before);
        if improvement > marginal {
            return Verdict::Success;
        }
    }
    Verdict::Partial
}

/// Outcome of Verify
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyResult {
    pub issues_before: u32,
    pub issues_after: u32,
    pub build_passed: bool,
    pub build_exit_code: Option<i32>,
    pub verdict: Verdict,
}

impl VerifyResult {
    /// The error a failed verdict is reported as
    #[must_use]
    pub fn failure(&self) -> Option<EngineError> {
        if self.verdict != Verdict::Failure {
            None
        } else if !self.build_passed {
            Some(EngineError::BuildFailed {
                exit_code: self.build_exit_code,
            })
        } else {
            Some(EngineError::Regression {
                before: self.issues_before,
                after: self.issues_after,
            })
        }
    }
}

/// Runs the post-apply checks
#[derive(Clone, Copy)]
pub struct Verifier<'a> {
    analyzer: &'a dyn Analyzer,
    build: &'a dyn BuildRunner,
    marginal_improvement: f64,
}

impl std::fmt::Debug for Verifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("marginal_improvement", &self.marginal_improvement)
            .finish_non_exhaustive()
    }
}

impl<'a> Verifier<'a> {
    #[must_use]
    pub fn new(
        analyzer: &'a dyn Analyzer,
        build: &'a dyn BuildRunner,
        marginal_improvement: f64,
    ) -> Self {
        Self {
            analyzer,
            build,
            marginal_improvement,
        }
    }

    /// Re-analyze and build `workspace`, then judge against `baseline`
    ///
    /// # Errors
    /// - [`EngineError::Timeout`] if `limit` elapses
    /// - [`EngineError::Collaborator`] if the analyzer or the build cannot
    ///   be run at all
    ///
    /// A failing build or a regression is not an error here; it is the
    /// `failure` verdict.
    pub async fn verify(
        &self,
        workspace: &Path,
        baseline: &AnalysisReport,
        limit: Option<Duration>,
    ) -> Result<VerifyResult, EngineError> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.run(workspace, baseline))
                .await
                .map_err(|_| EngineError::Timeout {
                    phase: CyclePhase::Verify,
                    secs: limit.as_secs(),
                })?,
            None => self.run(workspace, baseline).await,
        }
    }

    async fn run(
        &self,
        workspace: &Path,
        baseline: &AnalysisReport,
    ) -> Result<VerifyResult, EngineError> {
        let after = self
            .analyzer
            .analyze(workspace)
            .await
            .map_err(|e| EngineError::Collaborator {
                tool: "analyzer",
                reason: e.to_string(),
            })?;
        if after.generated_at == baseline.generated_at {
            tracing::warn!(
                generated_at = %after.generated_at,
                "re-analysis returned the baseline report; it was not regenerated"
            );
        }

        let build = self
            .build
            .build(workspace)
            .await
            .map_err(|e| EngineError::Collaborator {
                tool: "build",
                reason: e.to_string(),
            })?;

        let issues_before = baseline.issue_count();
        let issues_after = after.issue_count();
        let verdict = judge(issues_before, issues_after, build.passed, self.marginal_improvement);
        tracing::info!(
            issues_before,
            issues_after,
            weight_before = baseline.severity_weight(),
            weight_after = after.severity_weight(),
            build_passed = build.passed,
            verdict = %verdict,
            "verification complete"
        );
        Ok(VerifyResult {
            issues_before,
            issues_after,
            build_passed: build.passed,
            build_exit_code: build.exit_code,
            verdict,
        })
    }
}
