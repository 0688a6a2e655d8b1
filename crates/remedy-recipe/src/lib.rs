//! Remedy Recipes
//!
//! Issues reported by the analyzer and the recipes that fix them.
//!
//! # Core Concepts
//!
//! - [`Issue`]: one static-analysis finding; only `handoff_eligible` issues
//!   are ever remediated
//! - [`Recipe`]: applicability predicate plus patch generator
//! - [`Patch`]: full-file replacement tagged with the hash it was generated
//!   against
//! - [`RecipeRegistry`]: id-ordered recipe catalog
//!
//! # Example
//!
//! ```rust
//! use remedy_artifact::WorkspacePath;
//! use remedy_recipe::{Issue, RecipeRegistry, Severity};
//!
//! let registry = RecipeRegistry::with_builtins();
//! let file = WorkspacePath::new("src/a.py").unwrap();
//! let issue = Issue::new("W1", file, 4, Severity::Low, "whitespace")
//!     .eligible();
//!
//! let ids: Vec<_> = registry.applicable(&issue).map(|r| r.id()).collect();
//! assert_eq!(ids, ["trailing-whitespace"]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builtin;
mod issue;
mod recipe;
mod registry;

pub use builtin::{
    RegexRewriteRecipe, RegexRewriteSpec, RemoveLineRecipe, RewriteScope, TrailingWhitespaceRecipe,
};
pub use issue::{Issue, Severity};
pub use recipe::{edit_line, FsWorkingTree, LineSpan, Patch, PatchError, Recipe, WorkingTree};
pub use registry::{RecipeRegistry, RegistryError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
