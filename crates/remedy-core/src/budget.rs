//! Risk budget guard
//!
//! Two independent caps per cycle: distinct files touched ≤ `max_files`, and
//! changed lines per file ≤ `max_loc_per_file`. Candidates are admitted in
//! order; one that would break either cap is dropped on its own and
//! evaluation continues with the next. Exactly at a limit is admitted.

use crate::config::EngineConfig;
use crate::decision::SelectedAction;
use remedy_artifact::WorkspacePath;
use std::collections::BTreeMap;

/// Budget caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_files: usize,
    pub max_loc_per_file: u32,
}

impl From<&EngineConfig> for BudgetLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_files: config.max_files,
            max_loc_per_file: config.max_loc_per_file,
        }
    }
}

/// Why a candidate was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetRejection {
    TooManyFiles { limit: usize },
    TooManyLines { file: WorkspacePath, total: u32, limit: u32 },
}

/// Running admission state for one cycle
#[derive(Debug, Clone)]
pub struct BudgetGuard {
    limits: BudgetLimits,
    loc_by_file: BTreeMap<WorkspacePath, u32>,
}

impl BudgetGuard {
    #[must_use]
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            loc_by_file: BTreeMap::new(),
        }
    }

    /// Check whether `loc` more lines in `file` fit
    ///
    /// # Errors
    /// Returns the cap that would be exceeded
    pub fn check(&self, file: &WorkspacePath, loc: u32) -> Result<(), BudgetRejection> {
        let used = self.loc_by_file.get(file);
        if used.is_none() && self.loc_by_file.len() >= self.limits.max_files {
            return Err(BudgetRejection::TooManyFiles {
                limit: self.limits.max_files,
            });
        }
        let total = used.copied().unwrap_or(0).saturating_add(loc);
        if total > self.limits.max_loc_per_file {
            return Err(BudgetRejection::TooManyLines {
                file: file.clone(),
                total,
                limit: self.limits.max_loc_per_file,
            });
        }
        Ok(())
    }

    /// Admit `loc` lines in `file` if they fit
    ///
    /// # Errors
    /// Returns the cap that would be exceeded; nothing is recorded then
    pub fn try_admit(&mut self, file: &WorkspacePath, loc: u32) -> Result<(), BudgetRejection> {
        self.check(file, loc)?;
        *self.loc_by_file.entry(file.clone()).or_insert(0) += loc;
        Ok(())
    }

    /// Distinct files admitted so far
    #[inline]
    #[must_use]
    pub fn files_used(&self) -> usize {
        self.loc_by_file.len()
    }

    /// Lines admitted for `file`
    #[inline]
    #[must_use]
    pub fn loc_used(&self, file: &WorkspacePath) -> u32 {
        self.loc_by_file.get(file).copied().unwrap_or(0)
    }
}

/// Filter `candidates` (already in priority order) down to the budget
#[must_use]
pub fn apply_budget(candidates: Vec<SelectedAction>, limits: BudgetLimits) -> Vec<SelectedAction> {
    let mut guard = BudgetGuard::new(limits);
    candidates
        .into_iter()
        .filter(|c| match guard.try_admit(&c.issue.file, c.estimated_loc) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(
                    issue = %c.issue.id,
                    recipe = %c.recipe_id,
                    ?reason,
                    "dropped by risk budget"
                );
                false
            }
        })
        .collect()
}
