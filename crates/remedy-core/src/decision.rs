//! Decision engine
//!
//! Ranks every (eligible issue, applicable recipe) pair by
//! `trust × confidence`, drops pairs under the trust threshold, then greedily
//! admits the best pairs that neither conflict with an earlier pick nor break
//! the risk budget.
//!
//! Ordering is total: score (descending), then severity (critical first),
//! recipe id, issue id, file and line. Equal input always gives equal output.

use crate::budget::{BudgetGuard, BudgetLimits};
use crate::config::EngineConfig;
use crate::scoring::{clamp_probability, ConfidenceScorer, FeatureVector};
use remedy_artifact::WorkspacePath;
use remedy_ledger::TrustRecord;
use remedy_recipe::{Issue, LineSpan, Recipe, RecipeRegistry};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One (issue, recipe) pair chosen for this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedAction {
    pub issue: Issue,
    pub recipe_id: String,
    /// `trust × confidence`
    pub score: f64,
    /// Lines of `issue.file` the recipe may touch
    pub span: LineSpan,
    pub estimated_loc: u32,
}

impl SelectedAction {
    /// True if both actions cannot be applied in the same batch
    ///
    /// Two actions conflict when they target the same issue, or the same file
    /// with overlapping line spans.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        (self.issue.id == other.issue.id && self.issue.file == other.issue.file)
            || (self.issue.file == other.issue.file && self.span.overlaps(&other.span))
    }

    fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.issue.severity.cmp(&self.issue.severity))
            .then_with(|| self.recipe_id.cmp(&other.recipe_id))
            .then_with(|| self.issue.id.cmp(&other.issue.id))
            .then_with(|| self.issue.file.cmp(&other.issue.file))
            .then_with(|| self.issue.line.cmp(&other.issue.line))
    }
}

/// Outcome of Decide
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Actions to apply, best first
    pub selected: Vec<SelectedAction>,
    /// Eligible issues seen
    pub eligible: usize,
    /// Scored pairs
    pub considered: usize,
    /// Pairs under the trust threshold
    pub below_threshold: usize,
    /// Pairs skipped for overlapping an earlier pick
    pub conflicts: usize,
    /// Pairs refused by the risk budget
    pub over_budget: usize,
}

impl Decision {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Distinct recipe ids selected, sorted
    #[must_use]
    pub fn recipe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.selected.iter().map(|a| a.recipe_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Selects a cycle's action set
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine<'a> {
    registry: &'a RecipeRegistry,
    scorer: &'a dyn ConfidenceScorer,
    min_trust_threshold: f64,
    limits: BudgetLimits,
}

impl<'a> DecisionEngine<'a> {
    #[must_use]
    pub fn new(
        registry: &'a RecipeRegistry,
        scorer: &'a dyn ConfidenceScorer,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            scorer,
            min_trust_threshold: config.min_trust_threshold,
            limits: BudgetLimits::from(config),
        }
    }

    /// Choose actions for `issues`
    ///
    /// `trust` is the trust table at the start of the cycle; recipes missing
    /// from it carry the neutral prior. `file_sizes` feeds the size feature
    /// (missing files count as empty).
    #[must_use]
    pub fn decide(
        &self,
        issues: &[Issue],
        trust: &BTreeMap<String, TrustRecord>,
        file_sizes: &BTreeMap<WorkspacePath, u64>,
    ) -> Decision {
        let category_rates = self.category_success_rates(trust);
        let mut decision = Decision::default();
        let mut ranked = Vec::new();

        for issue in issues.iter().filter(|i| i.handoff_eligible) {
            decision.eligible += 1;
            for recipe in self.candidates_for(issue, trust) {
                let record = trust.get(recipe.id()).cloned().unwrap_or_default();
                let features = FeatureVector {
                    issue_category: issue.category.clone(),
                    recipe_category: recipe.category().to_string(),
                    severity: issue.severity,
                    file_size_bytes: file_sizes.get(&issue.file).copied().unwrap_or(0),
                    category_success_rate: category_rates.get(recipe.category()).copied().flatten(),
                    recipe_attempts: record.attempts(),
                };
                let confidence = clamp_probability(self.scorer.confidence(&features));
                let score = clamp_probability(record.score) * confidence;
                decision.considered += 1;

                if score < self.min_trust_threshold {
                    decision.below_threshold += 1;
                    tracing::debug!(
                        issue = %issue.id,
                        recipe = recipe.id(),
                        score,
                        "below trust threshold"
                    );
                    continue;
                }
                ranked.push(SelectedAction {
                    issue: issue.clone(),
                    recipe_id: recipe.id().to_string(),
                    score,
                    span: recipe.affected_span(issue),
                    estimated_loc: recipe.estimated_loc(issue),
                });
            }
        }

        ranked.sort_by(SelectedAction::rank);

        let mut guard = BudgetGuard::new(self.limits);
        for candidate in ranked {
            if decision.selected.iter().any(|s| s.conflicts_with(&candidate)) {
                decision.conflicts += 1;
                continue;
            }
            if let Err(reason) = guard.try_admit(&candidate.issue.file, candidate.estimated_loc) {
                decision.over_budget += 1;
                tracing::debug!(
                    issue = %candidate.issue.id,
                    recipe = %candidate.recipe_id,
                    ?reason,
                    "dropped by risk budget"
                );
                continue;
            }
            decision.selected.push(candidate);
        }

        tracing::info!(
            eligible = decision.eligible,
            considered = decision.considered,
            selected = decision.selected.len(),
            below_threshold = decision.below_threshold,
            conflicts = decision.conflicts,
            over_budget = decision.over_budget,
            "decision made"
        );
        decision
    }

    /// Enabled recipes applicable to `issue`, narrowed to its hint if the
    /// hinted recipe exists
    fn candidates_for(
        &self,
        issue: &Issue,
        trust: &BTreeMap<String, TrustRecord>,
    ) -> Vec<&'a Arc<dyn Recipe>> {
        let enabled = |r: &&Arc<dyn Recipe>| !trust.get(r.id()).is_some_and(|t| t.disabled);

        if let Some(hint) = issue.recipe_hint.as_deref() {
            match self.registry.get(hint) {
                Some(recipe) => {
                    return Some(recipe)
                        .filter(|r| r.applies_to(issue))
                        .filter(enabled)
                        .into_iter()
                        .collect();
                }
                None => tracing::warn!(
                    issue = %issue.id,
                    hint,
                    "recipe hint names no registered recipe; ignored"
                ),
            }
        }
        let registry: &'a RecipeRegistry = self.registry;
        registry.iter().filter(|r| r.applies_to(issue)).filter(enabled).collect()
    }

    /// Pooled success rate of each recipe category, `None` if untried
    fn category_success_rates(
        &self,
        trust: &BTreeMap<String, TrustRecord>,
    ) -> BTreeMap<String, Option<f64>> {
        let mut pooled: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for recipe in self.registry.iter() {
            let entry = pooled.entry(recipe.category().to_string()).or_default();
            if let Some(record) = trust.get(recipe.id()) {
                entry.0 = entry.0.saturating_add(record.successes);
                entry.1 = entry.1.saturating_add(record.attempts());
            }
        }
        pooled
            .into_iter()
            .map(|(category, (successes, attempts))| {
                let rate = (attempts > 0).then(|| f64::from(successes) / f64::from(attempts));
                (category, rate)
            })
            .collect()
    }
}
