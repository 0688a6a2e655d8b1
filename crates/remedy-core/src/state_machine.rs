//! Cycle phase state machine
//!
//! ```text
//! Observe → Decide → Act → Verify → Learn → Done
//!             │       │       │
//!             └→ Done └───────┴→ RolledBack
//! ```
//!
//! `Decide → Done` is the no-op exit. `Done` and `RolledBack` are terminal.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Cycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    Observe,
    Decide,
    Act,
    Verify,
    Learn,
    Done,
    RolledBack,
}

impl CyclePhase {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::RolledBack)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Decide => "decide",
            Self::Act => "act",
            Self::Verify => "verify",
            Self::Learn => "learn",
            Self::Done => "done",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: CyclePhase) -> &'static [CyclePhase] {
    use CyclePhase::{Act, Decide, Done, Learn, Observe, RolledBack, Verify};
    match from {
        Observe => &[Decide],
        Decide => &[Act, Done],
        Act => &[Verify, RolledBack],
        Verify => &[Learn, RolledBack],
        Learn => &[Done],
        Done | RolledBack => &[],
    }
}

/// Validate a phase transition
///
/// # Errors
/// Returns [`EngineError::IllegalTransition`] if `to` is not reachable
pub fn validate_transition(from: CyclePhase, to: CyclePhase) -> Result<(), EngineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition { from, to })
    }
}

/// Point in time by which a phase must finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    phase: CyclePhase,
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now
    #[must_use]
    pub fn after(phase: CyclePhase, limit: Duration) -> Self {
        Self {
            phase,
            at: Instant::now() + limit,
            limit,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// # Errors
    /// Returns [`EngineError::Timeout`] once the deadline has passed
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_expired() {
            Err(self.elapsed_error())
        } else {
            Ok(())
        }
    }

    /// Timeout error for this deadline
    #[must_use]
    pub fn elapsed_error(&self) -> EngineError {
        EngineError::Timeout {
            phase: self.phase,
            secs: self.limit.as_secs(),
        }
    }
}

/// Tracks one cycle's walk through the phases
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: CyclePhase,
    visited: Vec<CyclePhase>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    /// Start in `Observe`
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: CyclePhase::Observe,
            visited: vec![CyclePhase::Observe],
        }
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> CyclePhase {
        self.current
    }

    /// Every phase entered so far, in order
    #[inline]
    #[must_use]
    pub fn visited(&self) -> &[CyclePhase] {
        &self.visited
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`EngineError::IllegalTransition`] if the move is not allowed
    pub fn advance(&mut self, to: CyclePhase) -> Result<(), EngineError> {
        validate_transition(self.current, to)?;
        tracing::info!(from = %self.current, to = %to, "phase transition");
        self.current = to;
        self.visited.push(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CyclePhase::*;

    #[test]
    fn happy_path_is_strictly_ordered() {
        let mut machine = PhaseMachine::new();
        for phase in [Decide, Act, Verify, Learn, Done] {
            machine.advance(phase).unwrap();
        }
        assert_eq!(machine.visited(), &[Observe, Decide, Act, Verify, Learn, Done]);
        assert!(machine.current().is_terminal());
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert!(validate_transition(Observe, Act).is_err());
        assert!(validate_transition(Decide, Verify).is_err());
        assert!(validate_transition(Act, Learn).is_err());
        assert!(validate_transition(Observe, RolledBack).is_err());
        assert!(validate_transition(Decide, RolledBack).is_err());
    }

    #[test]
    fn rollback_only_from_act_or_verify() {
        for phase in [Observe, Decide, Act, Verify, Learn, Done, RolledBack] {
            let allowed = validate_transition(phase, RolledBack).is_ok();
            assert_eq!(allowed, matches!(phase, Act | Verify), "{phase}");
        }
    }

    #[test]
    fn deadline_expiry() {
        let open = Deadline::after(Act, Duration::from_secs(60));
        assert!(open.check().is_ok());
        let closed = Deadline::after(Verify, Duration::ZERO);
        assert!(matches!(
            closed.check(),
            Err(EngineError::Timeout { phase: Verify, secs: 0 })
        ));
    }

    #[test]
    fn terminal_states_absorb() {
        assert!(allowed_transitions(Done).is_empty());
        assert!(allowed_transitions(RolledBack).is_empty());
        let mut machine = PhaseMachine::new();
        machine.advance(Decide).unwrap();
        machine.advance(Done).unwrap();
        assert!(matches!(
            machine.advance(Act),
            Err(EngineError::IllegalTransition { from: Done, to: Act })
        ));
    }
}
