//! Single-line cleanups

use crate::issue::Issue;
use crate::recipe::{edit_line, Patch, PatchError, Recipe, WorkingTree};
use regex::Regex;

/// Strips trailing spaces and tabs from the flagged line
#[derive(Debug, Clone, Default)]
pub struct TrailingWhitespaceRecipe;

impl TrailingWhitespaceRecipe {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Recipe for TrailingWhitespaceRecipe {
    fn id(&self) -> &str {
        "trailing-whitespace"
    }

    fn category(&self) -> &str {
        "whitespace"
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        matches!(issue.category.as_str(), "whitespace" | "trailing-whitespace")
    }

    fn generate_patch(&self, issue: &Issue, tree: &dyn WorkingTree) -> Result<Patch, PatchError> {
        let content = tree.read(&issue.file)?;
        let after = edit_line(&issue.file, &content, issue.line, |body| {
            Ok(Some(body.trim_end_matches([' ', '\t']).to_string()))
        })?;
        Patch::rewrite(issue.file.clone(), &content, after)
    }
}

/// Deletes the flagged line when it matches a guard pattern
///
/// The guard keeps the recipe from deleting a line that moved since the
/// analysis ran.
#[derive(Debug, Clone)]
pub struct RemoveLineRecipe {
    id: String,
    category: String,
    guard: Regex,
}

impl RemoveLineRecipe {
    /// Create a line-removal recipe
    ///
    /// # Errors
    /// Returns [`PatchError::InvalidRecipe`] if `guard` does not compile
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        guard: &str,
    ) -> Result<Self, PatchError> {
        let id = id.into();
        let guard = Regex::new(guard).map_err(|e| PatchError::InvalidRecipe {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            category: category.into(),
            guard,
        })
    }

    /// Removes stray `console.log(`, `dbg!(` and `print(` statements
    #[must_use]
    pub fn debug_statement() -> Self {
        Self {
            id: "remove-debug-statement".to_string(),
            category: "debug-statement".to_string(),
            guard: Regex::new(r"^\s*(console\.log\(|dbg!\(|print\()")
                .unwrap_or_else(|_| unreachable!("static pattern")),
        }
    }

    /// Removes a single-line import the analyzer reports as unused
    #[must_use]
    pub fn unused_import() -> Self {
        Self {
            id: "remove-unused-import".to_string(),
            category: "unused-import".to_string(),
            guard: Regex::new(r"^\s*(import\s|from\s+\S+\s+import\s|use\s+[\w:{}, *]+;)")
                .unwrap_or_else(|_| unreachable!("static pattern")),
        }
    }
}

impl Recipe for RemoveLineRecipe {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        issue.category == self.category
    }

    fn generate_patch(&self, issue: &Issue, tree: &dyn WorkingTree) -> Result<Patch, PatchError> {
        let content = tree.read(&issue.file)?;
        let after = edit_line(&issue.file, &content, issue.line, |body| {
            if self.guard.is_match(body) {
                Ok(None)
            } else {
                Err(PatchError::Mismatch {
                    file: issue.file.clone(),
                    line: issue.line,
                    reason: format!("expected line matching '{}'", self.guard.as_str()),
                })
            }
        })?;
        Patch::rewrite(issue.file.clone(), &content, after)
    }
}
