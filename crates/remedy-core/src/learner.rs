//! Learning updater
//!
//! Folds each recipe's outcome into its trust score and appends one run
//! history entry per recipe. History is written for every outcome, failures
//! included; trust only moves when the outcome says something about the
//! recipe itself.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use remedy_ledger::{
    CycleId, MetricsDelta, Outcome, RunHistory, RunHistoryEntry, TrustRecord, TrustStore,
};

/// What one recipe's part in the cycle amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeOutcome {
    pub recipe_id: String,
    pub outcome: Outcome,
    /// `false` when the cycle failed for reasons unrelated to the recipe
    pub update_trust: bool,
}

impl RecipeOutcome {
    /// Outcome that moves trust
    #[must_use]
    pub fn scored(recipe_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            recipe_id: recipe_id.into(),
            outcome,
            update_trust: true,
        }
    }

    /// Outcome recorded in history only
    #[must_use]
    pub fn unscored(recipe_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            recipe_id: recipe_id.into(),
            outcome,
            update_trust: false,
        }
    }
}

/// Applies the Learn phase
#[derive(Clone, Copy)]
pub struct LearningUpdater<'a> {
    trust: &'a dyn TrustStore,
    history: &'a dyn RunHistory,
    learning_rate: f64,
}

impl std::fmt::Debug for LearningUpdater<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningUpdater")
            .field("learning_rate", &self.learning_rate)
            .finish_non_exhaustive()
    }
}

impl<'a> LearningUpdater<'a> {
    #[must_use]
    pub fn new(trust: &'a dyn TrustStore, history: &'a dyn RunHistory, learning_rate: f64) -> Self {
        Self {
            trust,
            history,
            learning_rate,
        }
    }

    /// Record `outcomes` for cycle `cycle_id`
    ///
    /// History is appended first so that a trust-store failure cannot lose
    /// the training record.
    ///
    /// # Errors
    /// Returns error if history or trust cannot be persisted
    pub fn learn(
        &self,
        cycle_id: CycleId,
        outcomes: &[RecipeOutcome],
        metrics_delta: MetricsDelta,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, TrustRecord)>, EngineError> {
        let entries: Vec<RunHistoryEntry> = outcomes
            .iter()
            .map(|o| RunHistoryEntry {
                cycle_id,
                recipe_id: o.recipe_id.clone(),
                outcome: o.outcome,
                metrics_delta,
                recorded_at: now,
            })
            .collect();
        self.history.append(&entries)?;

        let mut updated = Vec::new();
        for o in outcomes.iter().filter(|o| o.update_trust) {
            let record = self
                .trust
                .record_outcome(&o.recipe_id, o.outcome, self.learning_rate, now)?;
            metrics::gauge!("remedy_recipe_trust", "recipe" => o.recipe_id.clone())
                .set(record.score);
            tracing::info!(
                recipe = %o.recipe_id,
                outcome = ?o.outcome,
                score = record.score,
                "trust updated"
            );
            updated.push((o.recipe_id.clone(), record));
        }
        tracing::debug!(history = entries.len(), trust_updates = updated.len(), "learn complete");
        Ok(updated)
    }
}
