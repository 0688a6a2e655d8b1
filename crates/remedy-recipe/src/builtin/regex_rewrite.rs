//! Pattern-based rewrites
//!
//! A [`RegexRewriteRecipe`] replaces pattern matches on the issue line (or in
//! the whole file) with a replacement template (`$1`, `${name}`).

use crate::issue::Issue;
use crate::recipe::{edit_line, LineSpan, Patch, PatchError, Recipe, WorkingTree};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where a rewrite applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteScope {
    /// Only the line the issue points at
    #[default]
    Line,
    /// Every match in the file
    File,
}

/// Declarative form of a rewrite, as written in `remedy.toml`
///
/// ```toml
/// [[recipes.regex]]
/// id = "relative-services-import"
/// category = "import-path"
/// pattern = "from '@studio/core/services/([^']+)'"
/// replacement = "from '../../packages/core/src/services/$1'"
/// extensions = ["ts", "tsx"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRewriteSpec {
    pub id: String,
    pub category: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub scope: RewriteScope,
    /// File extensions the rewrite is limited to (empty = any)
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Overrides the Decide-time line estimate
    #[serde(default)]
    pub estimated_loc: Option<u32>,
}

/// Regex rewrite recipe
#[derive(Debug, Clone)]
pub struct RegexRewriteRecipe {
    id: String,
    category: String,
    pattern: Regex,
    replacement: String,
    scope: RewriteScope,
    extensions: Vec<String>,
    estimated_loc: u32,
}

impl RegexRewriteRecipe {
    /// Compile a rewrite from its declarative form
    ///
    /// # Errors
    /// Returns [`PatchError::InvalidRecipe`] if the pattern does not compile
    pub fn from_spec(spec: RegexRewriteSpec) -> Result<Self, PatchError> {
        let pattern = Regex::new(&spec.pattern).map_err(|e| PatchError::InvalidRecipe {
            id: spec.id.clone(),
            reason: e.to_string(),
        })?;
        if spec.id.trim().is_empty() {
            return Err(PatchError::InvalidRecipe {
                id: spec.id,
                reason: "empty id".to_string(),
            });
        }
        let estimated_loc = spec.estimated_loc.unwrap_or(match spec.scope {
            RewriteScope::Line => 1,
            RewriteScope::File => 10,
        });
        Ok(Self {
            id: spec.id,
            category: spec.category,
            pattern,
            replacement: spec.replacement,
            scope: spec.scope,
            extensions: spec.extensions,
            estimated_loc,
        })
    }

    /// `a.b.c` → `a.b?.c` on the flagged line of JS/TS sources
    #[must_use]
    pub fn null_safe_member_access() -> Self {
        Self {
            id: "null-safe-member-access".to_string(),
            category: "null-safety".to_string(),
            pattern: Regex::new(r"\b([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)")
                .unwrap_or_else(|_| unreachable!("static pattern")),
            replacement: "$1.$2?.$3".to_string(),
            scope: RewriteScope::Line,
            extensions: ["ts", "tsx", "js", "jsx", "mjs"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            estimated_loc: 1,
        }
    }

    fn extension_allowed(&self, issue: &Issue) -> bool {
        self.extensions.is_empty()
            || issue
                .file
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

impl Recipe for RegexRewriteRecipe {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        issue.category == self.category && self.extension_allowed(issue)
    }

    fn affected_span(&self, issue: &Issue) -> LineSpan {
        match self.scope {
            RewriteScope::Line => LineSpan::single(issue.line),
            RewriteScope::File => LineSpan::whole_file(),
        }
    }

    fn estimated_loc(&self, _issue: &Issue) -> u32 {
        self.estimated_loc
    }

    fn generate_patch(&self, issue: &Issue, tree: &dyn WorkingTree) -> Result<Patch, PatchError> {
        let content = tree.read(&issue.file)?;
        let after = match self.scope {
            RewriteScope::Line => edit_line(&issue.file, &content, issue.line, |body| {
                if !self.pattern.is_match(body) {
                    return Err(PatchError::Mismatch {
                        file: issue.file.clone(),
                        line: issue.line,
                        reason: format!("pattern '{}' not found", self.pattern.as_str()),
                    });
                }
                Ok(Some(
                    self.pattern
                        .replace_all(body, self.replacement.as_str())
                        .into_owned(),
                ))
            })?,
            RewriteScope::File => self
                .pattern
                .replace_all(&content, self.replacement.as_str())
                .into_owned(),
        };
        Patch::rewrite(issue.file.clone(), &content, after)
    }
}
