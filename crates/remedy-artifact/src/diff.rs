//! Line diffs for snapshot storage
//!
//! Provides [`LineDiff`], an edit script that rebuilds one text from another.
//! Snapshots store the *reverse* diff (after → before) so that only changed
//! lines are persisted, never full copies.
//!
//! Lines keep their terminators (`split_inclusive('\n')`), so applying a diff
//! reproduces the target byte-for-byte, including CRLF endings and a missing
//! final newline.

use serde::{Deserialize, Serialize};

/// Upper bound on the LCS table (cells) before falling back to a block
/// replacement of the differing middle section.
const MAX_LCS_CELLS: usize = 4_000_000;

/// One step of an edit script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    /// Copy the next `n` source lines
    Keep(usize),
    /// Skip the next `n` source lines
    Delete(usize),
    /// Emit these lines (terminators included)
    Insert(Vec<String>),
}

/// Edit script turning a source text into a target text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineDiff {
    ops: Vec<DiffOp>,
}

impl LineDiff {
    /// Compute the diff that turns `source` into `target`
    #[must_use]
    pub fn between(source: &str, target: &str) -> Self {
        let a: Vec<&str> = source.split_inclusive('\n').collect();
        let b: Vec<&str> = target.split_inclusive('\n').collect();

        let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
        let suffix = a[prefix..]
            .iter()
            .rev()
            .zip(b[prefix..].iter().rev())
            .take_while(|(x, y)| x == y)
            .count();

        let mut builder = OpsBuilder::default();
        builder.keep(prefix);
        diff_middle(
            &a[prefix..a.len() - suffix],
            &b[prefix..b.len() - suffix],
            &mut builder,
        );
        builder.keep(suffix);
        Self { ops: builder.ops }
    }

    /// Apply the diff to `source`
    ///
    /// # Errors
    /// Returns error if `source` does not have the shape the diff was
    /// computed against (too few or too many lines).
    pub fn apply(&self, source: &str) -> Result<String, DiffError> {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0usize;

        for op in &self.ops {
            match op {
                DiffOp::Keep(n) => {
                    let end = take(cursor, *n, lines.len())?;
                    lines[cursor..end].iter().for_each(|l| out.push_str(l));
                    cursor = end;
                }
                DiffOp::Delete(n) => {
                    cursor = take(cursor, *n, lines.len())?;
                }
                DiffOp::Insert(new_lines) => {
                    new_lines.iter().for_each(|l| out.push_str(l));
                }
            }
        }

        if cursor != lines.len() {
            return Err(DiffError::TrailingLines {
                consumed: cursor,
                total: lines.len(),
            });
        }
        Ok(out)
    }

    /// Edit operations
    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[DiffOp] {
        &self.ops
    }

    /// True when the diff is the identity
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, DiffOp::Keep(_)))
    }

    /// Number of source lines removed
    #[must_use]
    pub fn deleted_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DiffOp::Delete(n) => *n,
                _ => 0,
            })
            .sum()
    }

    /// Number of target lines added
    #[must_use]
    pub fn inserted_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DiffOp::Insert(lines) => lines.len(),
                _ => 0,
            })
            .sum()
    }

    /// Lines changed, counting each hunk as `max(deleted, inserted)`
    ///
    /// A one-line rewrite counts as 1, not 2.
    #[must_use]
    pub fn changed_lines(&self) -> usize {
        let mut total = 0;
        let (mut deleted, mut inserted) = (0, 0);
        for op in &self.ops {
            match op {
                DiffOp::Keep(_) => {
                    total += deleted.max(inserted);
                    deleted = 0;
                    inserted = 0;
                }
                DiffOp::Delete(n) => deleted += n,
                DiffOp::Insert(lines) => inserted += lines.len(),
            }
        }
        total + deleted.max(inserted)
    }
}

fn take(cursor: usize, n: usize, len: usize) -> Result<usize, DiffError> {
    let end = cursor + n;
    if end > len {
        return Err(DiffError::SourceTooShort {
            needed: end,
            available: len,
        });
    }
    Ok(end)
}

fn diff_middle(a: &[&str], b: &[&str], builder: &mut OpsBuilder) {
    if a.is_empty() || b.is_empty() || (a.len() + 1) * (b.len() + 1) > MAX_LCS_CELLS {
        builder.delete(a.len());
        builder.insert(b);
        return;
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let width = b.len() + 1;
    let mut lcs = vec![0u32; (a.len() + 1) * width];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            builder.keep(1);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            builder.delete(1);
            i += 1;
        } else {
            builder.insert(&b[j..=j]);
            j += 1;
        }
    }
    builder.delete(a.len() - i);
    builder.insert(&b[j..]);
}

/// Coalesces adjacent operations of the same kind
#[derive(Default)]
struct OpsBuilder {
    ops: Vec<DiffOp>,
}

impl OpsBuilder {
    fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(DiffOp::Keep(k)) = self.ops.last_mut() {
            *k += n;
        } else {
            self.ops.push(DiffOp::Keep(n));
        }
    }

    fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(DiffOp::Delete(d)) = self.ops.last_mut() {
            *d += n;
        } else {
            self.ops.push(DiffOp::Delete(n));
        }
    }

    fn insert(&mut self, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        if let Some(DiffOp::Insert(existing)) = self.ops.last_mut() {
            existing.extend(lines.iter().map(|l| (*l).to_string()));
        } else {
            self.ops
                .push(DiffOp::Insert(lines.iter().map(|l| (*l).to_string()).collect()));
        }
    }
}

/// Errors applying a diff
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// Diff needs more source lines than exist
    #[error("source too short: diff needs {needed} lines, source has {available}")]
    SourceTooShort { needed: usize, available: usize },

    /// Source has lines the diff does not account for
    #[error("source has trailing lines: consumed {consumed} of {total}")]
    TrailingLines { consumed: usize, total: usize },
}
