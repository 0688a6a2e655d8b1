//! Recipe trait and patch types
//!
//! Provides the [`Recipe`] trait: a remediation strategy with an
//! applicability predicate and a patch generator. New remediation categories
//! are added by registering new implementations, never by subclassing.

use crate::issue::Issue;
use remedy_artifact::{ContentHash, LineDiff, PathError, WorkspacePath};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Remediation strategy
///
/// # Contract
/// - `applies_to` must be pure: it sees only the issue, never the file system
/// - `generate_patch` must not write anything; it returns the full new file
///   content and the engine decides whether and when to write it
/// - `affected_span` must cover every line `generate_patch` may touch
pub trait Recipe: Send + Sync + Debug {
    /// Stable identifier (trust scores are keyed by it)
    fn id(&self) -> &str;

    /// Remediation category, used as a scoring feature
    fn category(&self) -> &str;

    /// Applicability predicate
    fn applies_to(&self, issue: &Issue) -> bool;

    /// Lines of the issue's file this recipe may change
    fn affected_span(&self, issue: &Issue) -> LineSpan {
        LineSpan::single(issue.line)
    }

    /// Lines expected to change, known before the patch is generated
    fn estimated_loc(&self, _issue: &Issue) -> u32 {
        1
    }

    /// Produce the full-file replacement for `issue.file`
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the recipe cannot produce
    /// a change for this issue
    fn generate_patch(&self, issue: &Issue, tree: &dyn WorkingTree) -> Result<Patch, PatchError>;
}

/// Read access to the files a recipe patches
pub trait WorkingTree: Send + Sync {
    /// Current content of `path`
    ///
    /// # Errors
    /// Returns error if the file does not exist or is not UTF-8
    fn read(&self, path: &WorkspacePath) -> Result<String, PatchError>;
}

/// Working tree backed by the file system
#[derive(Debug, Clone)]
pub struct FsWorkingTree {
    root: PathBuf,
}

impl FsWorkingTree {
    /// Create tree rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorkingTree for FsWorkingTree {
    fn read(&self, path: &WorkspacePath) -> Result<String, PatchError> {
        std::fs::read_to_string(path.resolve(&self.root)).map_err(|source| PatchError::Read {
            path: path.clone(),
            source,
        })
    }
}

/// Full-file replacement produced by a recipe
///
/// Ephemeral: produced and consumed within one Act phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub file: WorkspacePath,
    /// Hash of the content the patch was generated against
    pub before_hash: ContentHash,
    pub after_content: String,
    pub loc_changed: u32,
}

impl Patch {
    /// Build a patch from the old and new content of `file`
    ///
    /// # Errors
    /// Returns [`PatchError::NoChange`] when the contents are identical
    pub fn rewrite(file: WorkspacePath, before: &str, after: String) -> Result<Self, PatchError> {
        if before == after {
            return Err(PatchError::NoChange { file });
        }
        let changed = LineDiff::between(before, &after).changed_lines();
        Ok(Self {
            file,
            before_hash: ContentHash::compute(before.as_bytes()),
            after_content: after,
            loc_changed: u32::try_from(changed).unwrap_or(u32::MAX),
        })
    }

    /// Hash of the patched content
    #[must_use]
    pub fn after_hash(&self) -> ContentHash {
        ContentHash::compute(self.after_content.as_bytes())
    }
}

/// Inclusive, 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    /// Span of a single line
    #[inline]
    #[must_use]
    pub const fn single(line: u32) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    /// Span from `start` to `end`, swapped if given backwards
    #[inline]
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Span covering any file
    #[inline]
    #[must_use]
    pub const fn whole_file() -> Self {
        Self {
            start: 0,
            end: u32::MAX,
        }
    }

    /// True if the spans share at least one line
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Errors from patch generation
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: WorkspacePath,
        #[source]
        source: std::io::Error,
    },

    /// Issue line is not in the file
    #[error("line {line} out of range for {file} ({len} lines)")]
    LineOutOfRange {
        file: WorkspacePath,
        line: u32,
        len: usize,
    },

    /// The recipe produced identical content
    #[error("recipe produced no change for {file}")]
    NoChange { file: WorkspacePath },

    /// The target line does not have the shape the recipe expects
    #[error("line {line} of {file} does not match: {reason}")]
    Mismatch {
        file: WorkspacePath,
        line: u32,
        reason: String,
    },

    /// Invalid recipe definition
    #[error("invalid recipe '{id}': {reason}")]
    InvalidRecipe { id: String, reason: String },

    /// Path error
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// Rewrite the 1-based `line` of `content`, keeping its terminator
///
/// `edit` receives the line body without `\n`/`\r\n` and returns the new body,
/// or `None` to delete the line entirely.
///
/// # Errors
/// Returns [`PatchError::LineOutOfRange`] if the line does not exist
pub fn edit_line<F>(
    file: &WorkspacePath,
    content: &str,
    line: u32,
    edit: F,
) -> Result<String, PatchError>
where
    F: FnOnce(&str) -> Result<Option<String>, PatchError>,
{
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let idx = (line as usize)
        .checked_sub(1)
        .filter(|i| *i < lines.len())
        .ok_or_else(|| PatchError::LineOutOfRange {
            file: file.clone(),
            line,
            len: lines.len(),
        })?;

    let raw = lines[idx];
    let (body, terminator) = split_terminator(raw);

    let mut out = String::with_capacity(content.len());
    lines[..idx].iter().for_each(|l| out.push_str(l));
    if let Some(new_body) = edit(body)? {
        out.push_str(&new_body);
        out.push_str(terminator);
    }
    lines[idx + 1..].iter().for_each(|l| out.push_str(l));
    Ok(out)
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}
