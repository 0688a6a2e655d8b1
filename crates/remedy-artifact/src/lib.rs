//! Remedy Artifact Primitives
//!
//! Content hashing, line diffs and workspace-relative paths shared by every
//! other remedy crate.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: 32-byte Blake3 hash identifying exact file contents
//! - [`Sha256Digest`]: digest for persisted integrity checks and hash chains
//! - [`LineDiff`]: line edit script; snapshots store after → before diffs
//! - [`WorkspacePath`]: normalized relative path that cannot escape the root
//!
//! # Example
//!
//! ```rust
//! use remedy_artifact::{ContentHash, LineDiff};
//!
//! let before = "let a = 1;  \nlet b = 2;\n";
//! let after = "let a = 1;\nlet b = 2;\n";
//!
//! let undo = LineDiff::between(after, before);
//! assert_eq!(undo.apply(after).unwrap(), before);
//! let restored = undo.apply(after).unwrap();
//! assert_eq!(ContentHash::compute(before.as_bytes()), ContentHash::compute(restored.as_bytes()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod diff;
mod hash;
mod path;

pub use diff::{DiffError, DiffOp, LineDiff};
pub use hash::{ContentHash, DigestBuilder, HashError, Sha256Digest};
pub use path::{PathError, WorkspacePath};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
