//! Static-analysis findings
//!
//! [`Issue`] is produced by the external analyzer and is read-only to the
//! engine. Field names follow the analyzer's camelCase report format.

use remedy_artifact::WorkspacePath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used when summarizing issue sets
    #[inline]
    #[must_use]
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 4,
            Severity::Critical => 8,
        }
    }

    /// Position in `[0, 1]`, Low = 0 and Critical = 1
    #[inline]
    #[must_use]
    pub fn normalized(self) -> f64 {
        match self {
            Severity::Low => 0.0,
            Severity::Medium => 1.0 / 3.0,
            Severity::High => 2.0 / 3.0,
            Severity::Critical => 1.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One static-analysis finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub file: WorkspacePath,
    /// 1-based line number
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    /// Sole gate for automated remediation
    #[serde(default)]
    pub handoff_eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_hint: Option<String>,
}

impl Issue {
    /// Create an issue that is not yet handoff-eligible
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        file: WorkspacePath,
        line: u32,
        severity: Severity,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file,
            line,
            column: None,
            severity,
            category: category.into(),
            message: String::new(),
            handoff_eligible: false,
            recipe_hint: None,
        }
    }

    /// Mark the issue as safe for automated remediation
    #[inline]
    #[must_use]
    pub fn eligible(mut self) -> Self {
        self.handoff_eligible = true;
        self
    }

    /// Set message
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Suggest a specific recipe
    #[inline]
    #[must_use]
    pub fn with_hint(mut self, recipe_id: impl Into<String>) -> Self {
        self.recipe_hint = Some(recipe_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.normalized(), 1.0);
    }

    #[test]
    fn issue_parses_analyzer_format() {
        let json = r#"{
            "id": "TS-17",
            "file": "app/api/route.ts",
            "line": 12,
            "severity": "high",
            "category": "null-safety",
            "message": "possible null dereference",
            "handoffEligible": true,
            "recipeHint": "null-safe-member-access"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.file.as_str(), "app/api/route.ts");
        assert!(issue.handoff_eligible);
        assert_eq!(issue.column, None);
        assert_eq!(issue.recipe_hint.as_deref(), Some("null-safe-member-access"));
    }

    #[test]
    fn missing_handoff_flag_means_not_eligible() {
        let json = r#"{"id":"1","file":"a.py","line":1,"severity":"low",
                      "category":"style","message":""}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(!issue.handoff_eligible);
    }
}
