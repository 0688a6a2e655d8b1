//! Identifiers and outcome enums shared by the ledger and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Remediation cycle identifier
///
/// ULIDs sort by creation time, so the newest snapshot is the greatest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Ulid);

impl CycleId {
    /// Fresh id stamped with the current time
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Id with an explicit millisecond timestamp
    #[inline]
    #[must_use]
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }

    /// Creation time encoded in the id
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        i64::try_from(self.0.timestamp_ms())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Cycle verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Partial,
    Failure,
    /// No recipe cleared the trust threshold; nothing was touched
    Noop,
}

impl Verdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Success => "success",
            Verdict::Partial => "partial",
            Verdict::Failure => "failure",
            Verdict::Noop => "noop",
        }
    }

    /// Per-recipe outcome this verdict implies, if any
    #[must_use]
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Verdict::Success => Some(Outcome::Success),
            Verdict::Partial => Some(Outcome::Partial),
            Verdict::Failure => Some(Outcome::Failure),
            Verdict::Noop => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one recipe application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

impl Outcome {
    /// EMA target for this outcome
    #[inline]
    #[must_use]
    pub fn signal(self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_ids_sort_by_time() {
        let older = CycleId::from_parts(1_000, u128::MAX);
        let newer = CycleId::from_parts(2_000, 0);
        assert!(newer > older);
        assert_eq!(older.created_at().timestamp_millis(), 1_000);
    }

    #[test]
    fn cycle_id_round_trips_text() {
        let id = CycleId::new();
        let parsed: CycleId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-ulid".parse::<CycleId>().is_err());
    }

    #[test]
    fn verdict_maps_to_outcome() {
        assert_eq!(Verdict::Noop.outcome(), None);
        assert_eq!(Verdict::Partial.outcome().map(Outcome::signal), Some(0.5));
        assert_eq!(serde_json::to_string(&Verdict::Failure).unwrap(), "\"failure\"");
    }
}
