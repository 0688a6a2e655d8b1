//! Confidence scoring
//!
//! The confidence model is a pure function of a fixed [`FeatureVector`]. The
//! engine only needs a probability in `[0, 1]`; the real model is external
//! and [`HeuristicScorer`] stands in for it.

use remedy_recipe::Severity;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Inputs to the confidence model for one (issue, recipe) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub issue_category: String,
    pub recipe_category: String,
    pub severity: Severity,
    pub file_size_bytes: u64,
    /// Success rate of recipes in this recipe category, `None` if untried
    pub category_success_rate: Option<f64>,
    /// Times this recipe has been applied
    pub recipe_attempts: u32,
}

/// Pure confidence function
pub trait ConfidenceScorer: Send + Sync + Debug {
    /// Probability that applying the recipe fixes the issue
    fn confidence(&self, features: &FeatureVector) -> f64;
}

/// Clamp to `[0, 1]`, mapping NaN to 0
#[inline]
#[must_use]
pub fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Logistic model over hand-set weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicScorer {
    pub bias: f64,
    pub category_match: f64,
    pub severity: f64,
    pub success_rate: f64,
    pub large_file_penalty: f64,
    /// Files at or above this size take the full penalty
    pub large_file_bytes: u64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            bias: 0.5,
            category_match: 1.0,
            severity: 0.5,
            success_rate: 2.0,
            large_file_penalty: 0.8,
            large_file_bytes: 200 * 1024,
        }
    }
}

impl ConfidenceScorer for HeuristicScorer {
    fn confidence(&self, f: &FeatureVector) -> f64 {
        let matched = if f.issue_category == f.recipe_category { 1.0 } else { 0.0 };
        // Unknown history counts as a coin flip
        let rate = f.category_success_rate.map_or(0.5, clamp_probability);
        #[allow(clippy::cast_precision_loss)]
        let size = (f.file_size_bytes as f64 / self.large_file_bytes.max(1) as f64).min(1.0);

        let z = self.bias + self.category_match * matched + self.severity * f.severity.normalized()
            - self.large_file_penalty * size
            + self.success_rate * (rate - 0.5);
        clamp_probability(1.0 / (1.0 + (-z).exp()))
    }
}

/// Constant confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedScorer(pub f64);

impl ConfidenceScorer for FixedScorer {
    fn confidence(&self, _features: &FeatureVector) -> f64 {
        clamp_probability(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn features() -> FeatureVector {
        FeatureVector {
            issue_category: "whitespace".into(),
            recipe_category: "whitespace".into(),
            severity: Severity::Medium,
            file_size_bytes: 2_000,
            category_success_rate: None,
            recipe_attempts: 0,
        }
    }

    #[test]
    fn better_history_raises_confidence() {
        let scorer = HeuristicScorer::default();
        let cold = scorer.confidence(&features());
        let proven = scorer.confidence(&FeatureVector {
            category_success_rate: Some(0.95),
            ..features()
        });
        let failing = scorer.confidence(&FeatureVector {
            category_success_rate: Some(0.05),
            ..features()
        });
        assert!(proven > cold && cold > failing);
    }

    #[test]
    fn category_mismatch_and_size_lower_confidence() {
        let scorer = HeuristicScorer::default();
        let base = scorer.confidence(&features());
        let mismatched = scorer.confidence(&FeatureVector {
            recipe_category: "null-safety".into(),
            ..features()
        });
        let huge = scorer.confidence(&FeatureVector {
            file_size_bytes: 10_000_000,
            ..features()
        });
        assert!(mismatched < base);
        assert!(huge < base);
    }

    #[test]
    fn fixed_scorer_clamps() {
        assert_eq!(FixedScorer(1.7).confidence(&features()), 1.0);
        assert_eq!(FixedScorer(f64::NAN).confidence(&features()), 0.0);
    }

    proptest! {
        #[test]
        fn heuristic_is_a_probability(
            size in any::<u64>(),
            rate in proptest::option::of(-1.0f64..2.0),
            attempts in any::<u32>(),
        ) {
            let f = FeatureVector {
                file_size_bytes: size,
                category_success_rate: rate,
                recipe_attempts: attempts,
                ..features()
            };
            let c = HeuristicScorer::default().confidence(&f);
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }
}
