//! Per-recipe trust scores
//!
//! Trust is an exponential moving average of recipe outcomes:
//! `score' = score + α × (signal − score)`, clamped to `[0, 1]`. Unknown
//! recipes start at [`NEUTRAL_PRIOR`]. Records are never deleted; a recipe can
//! only be disabled.

use crate::error::{LedgerError, Result};
use crate::fsutil::{atomic_write, read_or_empty};
use crate::types::Outcome;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Score given to a recipe the first time it is seen
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// Trust statistics for one recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub score: f64,
    #[serde(default)]
    pub successes: u32,
    #[serde(default)]
    pub partials: u32,
    #[serde(default)]
    pub failures: u32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for TrustRecord {
    fn default() -> Self {
        Self {
            score: NEUTRAL_PRIOR,
            successes: 0,
            partials: 0,
            failures: 0,
            disabled: false,
            updated_at: None,
        }
    }
}

impl TrustRecord {
    /// Fold one outcome into the record
    pub fn observe(&mut self, outcome: Outcome, alpha: f64, now: DateTime<Utc>) {
        let alpha = alpha.clamp(0.0, 1.0);
        let next = self.score + alpha * (outcome.signal() - self.score);
        self.score = next.clamp(0.0, 1.0);
        match outcome {
            Outcome::Success => self.successes = self.successes.saturating_add(1),
            Outcome::Partial => self.partials = self.partials.saturating_add(1),
            Outcome::Failure => self.failures = self.failures.saturating_add(1),
        }
        self.updated_at = Some(now);
    }

    /// Total recorded applications
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.successes
            .saturating_add(self.partials)
            .saturating_add(self.failures)
    }

    /// Fraction of applications that fully succeeded, `None` before any
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        let attempts = self.attempts();
        (attempts > 0).then(|| f64::from(self.successes) / f64::from(attempts))
    }
}

/// Persistent trust-score table keyed by recipe id
pub trait TrustStore: Send + Sync {
    /// Record for `recipe_id`, or a neutral-prior record if never seen
    ///
    /// # Errors
    /// Returns error if the backing store is unreadable
    fn get(&self, recipe_id: &str) -> Result<TrustRecord>;

    /// All known records, ordered by recipe id
    ///
    /// # Errors
    /// Returns error if the backing store is unreadable
    fn all(&self) -> Result<BTreeMap<String, TrustRecord>>;

    /// Create a neutral-prior record if none exists
    ///
    /// # Errors
    /// Returns error if the record cannot be persisted
    fn ensure(&self, recipe_id: &str) -> Result<()>;

    /// Fold an outcome into `recipe_id`'s score and persist it
    ///
    /// # Errors
    /// Returns error if the record cannot be persisted
    fn record_outcome(
        &self,
        recipe_id: &str,
        outcome: Outcome,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> Result<TrustRecord>;

    /// Enable or disable a recipe; history is kept either way
    ///
    /// # Errors
    /// Returns error if the record cannot be persisted
    fn set_disabled(&self, recipe_id: &str, disabled: bool) -> Result<()>;
}

type Table = BTreeMap<String, TrustRecord>;

fn update_table(
    table: &mut Table,
    recipe_id: &str,
    outcome: Outcome,
    alpha: f64,
    now: DateTime<Utc>,
) -> TrustRecord {
    let record = table.entry(recipe_id.to_string()).or_default();
    let before = record.score;
    record.observe(outcome, alpha, now);
    tracing::debug!(recipe = recipe_id, ?outcome, before, after = record.score, "trust updated");
    record.clone()
}

/// Trust table persisted as one JSON document
///
/// The table is read once on open and written through atomically on every
/// change.
#[derive(Debug)]
pub struct FileTrustStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileTrustStore {
    /// Open (or start) the table at `path`
    ///
    /// # Errors
    /// Returns error if an existing file cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = read_or_empty(&path)?;
        let table = if bytes.is_empty() {
            Table::new()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::serde(&path, e))?
        };
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    fn persist(&self, table: &Table) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(table).map_err(|e| LedgerError::serde(&self.path, e))?;
        atomic_write(&self.path, &bytes)
    }
}

impl TrustStore for FileTrustStore {
    fn get(&self, recipe_id: &str) -> Result<TrustRecord> {
        Ok(self.table.lock().get(recipe_id).cloned().unwrap_or_default())
    }

    fn all(&self) -> Result<Table> {
        Ok(self.table.lock().clone())
    }

    fn ensure(&self, recipe_id: &str) -> Result<()> {
        let mut table = self.table.lock();
        if table.contains_key(recipe_id) {
            return Ok(());
        }
        table.insert(recipe_id.to_string(), TrustRecord::default());
        self.persist(&table)
    }

    fn record_outcome(
        &self,
        recipe_id: &str,
        outcome: Outcome,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> Result<TrustRecord> {
        let mut table = self.table.lock();
        let record = update_table(&mut table, recipe_id, outcome, alpha, now);
        self.persist(&table)?;
        Ok(record)
    }

    fn set_disabled(&self, recipe_id: &str, disabled: bool) -> Result<()> {
        let mut table = self.table.lock();
        table.entry(recipe_id.to_string()).or_default().disabled = disabled;
        self.persist(&table)
    }
}

/// In-memory trust table
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    table: Mutex<Table>,
}

impl MemoryTrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a recipe's score
    #[must_use]
    pub fn with_score(self, recipe_id: &str, score: f64) -> Self {
        self.table.lock().insert(
            recipe_id.to_string(),
            TrustRecord {
                score: score.clamp(0.0, 1.0),
                ..TrustRecord::default()
            },
        );
        self
    }
}

impl TrustStore for MemoryTrustStore {
    fn get(&self, recipe_id: &str) -> Result<TrustRecord> {
        Ok(self.table.lock().get(recipe_id).cloned().unwrap_or_default())
    }

    fn all(&self) -> Result<Table> {
        Ok(self.table.lock().clone())
    }

    fn ensure(&self, recipe_id: &str) -> Result<()> {
        self.table.lock().entry(recipe_id.to_string()).or_default();
        Ok(())
    }

    fn record_outcome(
        &self,
        recipe_id: &str,
        outcome: Outcome,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> Result<TrustRecord> {
        Ok(update_table(&mut self.table.lock(), recipe_id, outcome, alpha, now))
    }

    fn set_disabled(&self, recipe_id: &str, disabled: bool) -> Result<()> {
        self.table.lock().entry(recipe_id.to_string()).or_default().disabled = disabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    #[test]
    fn unknown_recipe_has_neutral_prior() {
        let store = MemoryTrustStore::new();
        let record = store.get("never-seen").unwrap();
        assert_eq!(record.score, NEUTRAL_PRIOR);
        assert_eq!(record.attempts(), 0);
        assert_eq!(record.success_rate(), None);
    }

    #[test]
    fn ema_step_matches_formula() {
        let store = MemoryTrustStore::new();
        let r = store.record_outcome("r", Outcome::Success, 0.1, now()).unwrap();
        assert!((r.score - 0.55).abs() < 1e-12);
        let r = store.record_outcome("r", Outcome::Failure, 0.1, now()).unwrap();
        assert!((r.score - 0.495).abs() < 1e-12);
        let r = store.record_outcome("r", Outcome::Partial, 0.1, now()).unwrap();
        assert!((r.score - 0.4955).abs() < 1e-12);
        assert_eq!((r.successes, r.failures, r.partials), (1, 1, 1));
        assert_eq!(r.updated_at, Some(now()));
    }

    #[test]
    fn file_store_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".remedy/trust.json");
        {
            let store = FileTrustStore::open(&path).unwrap();
            store.ensure("trailing-whitespace").unwrap();
            store
                .record_outcome("null-safe-member-access", Outcome::Success, 0.1, now())
                .unwrap();
            store.set_disabled("remove-unused-import", true).unwrap();
        }
        let store = FileTrustStore::open(&path).unwrap();
        let all = store.all().unwrap();
        assert_eq!(
            all.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["null-safe-member-access", "remove-unused-import", "trailing-whitespace"]
        );
        assert!((all["null-safe-member-access"].score - 0.55).abs() < 1e-12);
        assert!(all["remove-unused-import"].disabled);
        assert_eq!(all["trailing-whitespace"].score, NEUTRAL_PRIOR);
    }

    #[test]
    fn corrupt_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileTrustStore::open(&path), Err(LedgerError::Serde { .. })));
    }

    proptest! {
        #[test]
        fn repeated_success_rises_monotonically_toward_one(
            start in 0.0f64..1.0,
            alpha in 0.01f64..1.0,
            n in 1usize..200,
        ) {
            let store = MemoryTrustStore::new().with_score("r", start);
            let mut prev = start;
            for _ in 0..n {
                let score = store
                    .record_outcome("r", Outcome::Success, alpha, now())
                    .unwrap()
                    .score;
                prop_assert!(score >= prev);
                prop_assert!(score <= 1.0);
                prev = score;
            }
            let bound = (1.0 - start) * (1.0 - alpha).powi(i32::try_from(n).unwrap());
            prop_assert!(1.0 - prev <= bound + 1e-9);
        }

        #[test]
        fn repeated_failure_falls_monotonically_toward_zero(
            start in 0.0f64..1.0,
            alpha in 0.01f64..1.0,
            n in 1usize..200,
        ) {
            let store = MemoryTrustStore::new().with_score("r", start);
            let mut prev = start;
            for _ in 0..n {
                let score = store
                    .record_outcome("r", Outcome::Failure, alpha, now())
                    .unwrap()
                    .score;
                prop_assert!(score <= prev);
                prop_assert!(score >= 0.0);
                prev = score;
            }
        }
    }
}
