//! Built-in recipes
//!
//! Line-scoped rewrites and cleanups. Project-specific rewrites are declared
//! as [`RegexRewriteSpec`] entries in configuration.

mod line_cleanup;
mod regex_rewrite;

pub use line_cleanup::{RemoveLineRecipe, TrailingWhitespaceRecipe};
pub use regex_rewrite::{RegexRewriteRecipe, RegexRewriteSpec, RewriteScope};

use crate::recipe::Recipe;
use std::sync::Arc;

/// The default recipe catalog
#[must_use]
pub fn defaults() -> Vec<Arc<dyn Recipe>> {
    vec![
        Arc::new(TrailingWhitespaceRecipe::new()),
        Arc::new(RemoveLineRecipe::debug_statement()),
        Arc::new(RemoveLineRecipe::unused_import()),
        Arc::new(RegexRewriteRecipe::null_safe_member_access()),
    ]
}
