//! Action applier
//!
//! Act runs in two steps so that a failing recipe never leaves a half-written
//! batch behind:
//! 1. [`ActionApplier::prepare`] generates every patch in memory. Actions on
//!    the same file are chained bottom-up (highest line first) against the
//!    file's in-progress content, so earlier edits do not shift later ones.
//!    Nothing is written; any failure aborts the whole batch.
//! 2. [`ActionApplier::write`] replaces each file in full with an atomic
//!    rename, after checking that it still holds the content the patches
//!    were generated against.
//!
//! The controller snapshots [`PreparedBatch::captures`] between the two.
//!
//! With `parallel.workers` configured and a batch of at least
//! `parallel.min_files` files, both steps fan out over a bounded rayon pool.
//! Work is grouped by file, so no two tasks ever touch the same file.

use crate::config::{EngineConfig, ParallelConfig};
use crate::decision::SelectedAction;
use crate::error::EngineError;
use crate::state_machine::Deadline;
use rayon::prelude::*;
use remedy_artifact::{ContentHash, LineDiff, WorkspacePath};
use remedy_ledger::{atomic_write, FileCapture};
use remedy_recipe::{FsWorkingTree, PatchError, RecipeRegistry, WorkingTree};
use std::collections::BTreeMap;
use std::path::Path;

/// One file's patched content, not yet written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    pub file: WorkspacePath,
    pub before: String,
    pub after: String,
    /// Recipes that contributed, sorted
    pub recipes: Vec<String>,
    pub issues: Vec<String>,
    /// Changed lines between `before` and `after`
    pub loc_changed: u32,
}

impl PreparedFile {
    #[must_use]
    pub fn before_hash(&self) -> ContentHash {
        ContentHash::compute(self.before.as_bytes())
    }

    #[must_use]
    pub fn after_hash(&self) -> ContentHash {
        ContentHash::compute(self.after.as_bytes())
    }
}

/// Every file of one Act phase, in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedBatch {
    files: Vec<PreparedFile>,
}

impl PreparedBatch {
    #[inline]
    #[must_use]
    pub fn files(&self) -> &[PreparedFile] {
        &self.files
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Before/after pairs for the snapshot
    #[must_use]
    pub fn captures(&self) -> Vec<FileCapture> {
        self.files
            .iter()
            .map(|f| FileCapture {
                path: f.file.clone(),
                before: Some(f.before.clone()),
                after: f.after.clone(),
            })
            .collect()
    }

    /// Distinct recipes across the batch, sorted
    #[must_use]
    pub fn recipe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .files
            .iter()
            .flat_map(|f| f.recipes.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A file that was rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatch {
    pub file: WorkspacePath,
    pub recipes: Vec<String>,
    pub issues: Vec<String>,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub loc_changed: u32,
}

/// Reads the file being patched from memory, everything else from disk
struct OverlayTree<'t> {
    base: &'t FsWorkingTree,
    path: &'t WorkspacePath,
    content: &'t str,
}

impl WorkingTree for OverlayTree<'_> {
    fn read(&self, path: &WorkspacePath) -> Result<String, PatchError> {
        if path == self.path {
            Ok(self.content.to_string())
        } else {
            self.base.read(path)
        }
    }
}

/// Executes selected actions against the workspace
#[derive(Debug)]
pub struct ActionApplier<'a> {
    registry: &'a RecipeRegistry,
    tree: FsWorkingTree,
    max_loc_per_file: u32,
    parallel: ParallelConfig,
}

impl<'a> ActionApplier<'a> {
    #[must_use]
    pub fn new(registry: &'a RecipeRegistry, workspace: &Path, config: &EngineConfig) -> Self {
        Self {
            registry,
            tree: FsWorkingTree::new(workspace),
            max_loc_per_file: config.max_loc_per_file,
            parallel: config.parallel,
        }
    }

    /// Generate every patch of the batch without writing anything
    ///
    /// # Errors
    /// - [`EngineError::PatchGeneration`] naming the first recipe that failed
    /// - [`EngineError::BudgetExceeded`] if a file's real change is larger
    ///   than the per-file budget
    /// - [`EngineError::Timeout`] if `deadline` passes
    pub fn prepare(
        &self,
        actions: &[SelectedAction],
        deadline: Option<Deadline>,
    ) -> Result<PreparedBatch, EngineError> {
        let mut groups: BTreeMap<&WorkspacePath, Vec<&SelectedAction>> = BTreeMap::new();
        for action in actions {
            groups.entry(&action.issue.file).or_default().push(action);
        }
        let groups: Vec<_> = groups.into_iter().collect();

        let results: Vec<Result<Option<PreparedFile>, EngineError>> = self.fan_out(
            groups.len(),
            || {
                groups
                    .par_iter()
                    .map(|(file, group)| self.prepare_file(file, group, deadline))
                    .collect()
            },
            || {
                groups
                    .iter()
                    .map(|(file, group)| self.prepare_file(file, group, deadline))
                    .collect()
            },
        );

        // First failure in path order, so the reported recipe is stable
        let mut files = Vec::with_capacity(results.len());
        for result in results {
            if let Some(prepared) = result? {
                files.push(prepared);
            }
        }
        tracing::debug!(files = files.len(), actions = actions.len(), "patches prepared");
        Ok(PreparedBatch { files })
    }

    fn prepare_file(
        &self,
        file: &WorkspacePath,
        group: &[&SelectedAction],
        deadline: Option<Deadline>,
    ) -> Result<Option<PreparedFile>, EngineError> {
        let mut ordered = group.to_vec();
        ordered.sort_by(|a, b| {
            b.span
                .start
                .cmp(&a.span.start)
                .then_with(|| a.recipe_id.cmp(&b.recipe_id))
                .then_with(|| a.issue.id.cmp(&b.issue.id))
        });

        let failed = |action: &SelectedAction, source: PatchError| EngineError::PatchGeneration {
            recipe_id: action.recipe_id.clone(),
            issue_id: action.issue.id.clone(),
            source,
        };

        let Some(first) = ordered.first() else {
            return Ok(None);
        };
        let before = self.tree.read(file).map_err(|e| failed(*first, e))?;
        let mut current = before.clone();

        for &action in &ordered {
            if let Some(deadline) = deadline {
                deadline.check()?;
            }
            let recipe = self.registry.get(&action.recipe_id).ok_or_else(|| {
                failed(
                    action,
                    PatchError::InvalidRecipe {
                        id: action.recipe_id.clone(),
                        reason: "not registered".to_string(),
                    },
                )
            })?;
            let overlay = OverlayTree {
                base: &self.tree,
                path: file,
                content: &current,
            };
            let patch = recipe
                .generate_patch(&action.issue, &overlay)
                .map_err(|e| failed(action, e))?;
            if &patch.file != file
                || patch.before_hash != ContentHash::compute(current.as_bytes())
            {
                return Err(failed(
                    action,
                    PatchError::InvalidRecipe {
                        id: action.recipe_id.clone(),
                        reason: format!(
                            "patch for {} does not match the content it was given",
                            patch.file
                        ),
                    },
                ));
            }
            tracing::debug!(
                file = %file,
                recipe = %action.recipe_id,
                issue = %action.issue.id,
                loc = patch.loc_changed,
                "patch generated"
            );
            current = patch.after_content;
        }

        if current == before {
            tracing::debug!(file = %file, "patches cancel out; file skipped");
            return Ok(None);
        }

        let changed = LineDiff::between(&before, &current).changed_lines();
        let loc_changed = u32::try_from(changed).unwrap_or(u32::MAX);
        if loc_changed > self.max_loc_per_file {
            return Err(EngineError::BudgetExceeded {
                file: file.clone(),
                loc: loc_changed,
                limit: self.max_loc_per_file,
            });
        }

        let mut recipes: Vec<String> = ordered.iter().map(|a| a.recipe_id.clone()).collect();
        recipes.sort();
        recipes.dedup();
        let mut issues: Vec<String> = ordered.iter().map(|a| a.issue.id.clone()).collect();
        issues.sort();

        Ok(Some(PreparedFile {
            file: file.clone(),
            before,
            after: current,
            recipes,
            issues,
            loc_changed,
        }))
    }

    /// Write every prepared file
    ///
    /// # Errors
    /// See [`ActionApplier::write_into`]
    pub fn write(
        &self,
        batch: &PreparedBatch,
        deadline: Option<Deadline>,
    ) -> Result<Vec<AppliedPatch>, EngineError> {
        let mut applied = Vec::with_capacity(batch.len());
        self.write_into(batch, deadline, &mut applied)?;
        Ok(applied)
    }

    /// Write every prepared file, pushing each one written onto `applied`
    ///
    /// Files written before an error stay written and stay in `applied`;
    /// the caller restores the snapshot.
    ///
    /// # Errors
    /// - [`EngineError::FileChanged`] if a file no longer holds the content
    ///   its patches were generated against
    /// - [`EngineError::Timeout`] if `deadline` passes between files
    /// - I/O errors from the atomic write
    pub fn write_into(
        &self,
        batch: &PreparedBatch,
        deadline: Option<Deadline>,
        applied: &mut Vec<AppliedPatch>,
    ) -> Result<(), EngineError> {
        let results: Vec<Result<AppliedPatch, EngineError>> = self.fan_out(
            batch.len(),
            || {
                batch
                    .files
                    .par_iter()
                    .map(|f| self.write_file(f, deadline))
                    .collect()
            },
            || {
                // Sequential writes stop at the first failure
                let mut out = Vec::with_capacity(batch.len());
                for f in &batch.files {
                    let result = self.write_file(f, deadline);
                    let failed = result.is_err();
                    out.push(result);
                    if failed {
                        break;
                    }
                }
                out
            },
        );

        let mut first_error = None;
        for result in results {
            match result {
                Ok(patch) => applied.push(patch),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_file(
        &self,
        prepared: &PreparedFile,
        deadline: Option<Deadline>,
    ) -> Result<AppliedPatch, EngineError> {
        if let Some(deadline) = deadline {
            deadline.check()?;
        }
        let abs = prepared.file.resolve(self.tree.root());
        let current = std::fs::read(&abs).map_err(|e| EngineError::io(&abs, e))?;
        let before_hash = prepared.before_hash();
        if ContentHash::compute(&current) != before_hash {
            tracing::warn!(file = %prepared.file, "file changed after its patch was generated");
            return Err(EngineError::FileChanged {
                path: prepared.file.clone(),
            });
        }
        atomic_write(&abs, prepared.after.as_bytes())?;
        tracing::info!(
            file = %prepared.file,
            recipes = ?prepared.recipes,
            loc = prepared.loc_changed,
            "file rewritten"
        );
        Ok(AppliedPatch {
            file: prepared.file.clone(),
            recipes: prepared.recipes.clone(),
            issues: prepared.issues.clone(),
            before_hash,
            after_hash: prepared.after_hash(),
            loc_changed: prepared.loc_changed,
        })
    }

    /// Run `parallel` on a bounded pool when the batch qualifies, else `sequential`
    fn fan_out<T, P, S>(&self, files: usize, parallel: P, sequential: S) -> T
    where
        T: Send,
        P: FnOnce() -> T + Send,
        S: FnOnce() -> T,
    {
        let Some(workers) = self.parallel.workers_for(files) else {
            return sequential();
        };
        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("remedy-act-{i}"))
            .build()
        {
            Ok(pool) => {
                tracing::debug!(workers, files, "parallel act");
                pool.install(parallel)
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot start worker pool; applying sequentially");
                sequential()
            }
        }
    }
}
