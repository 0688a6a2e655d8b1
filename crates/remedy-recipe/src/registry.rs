//! Recipe registry
//!
//! Provides [`RecipeRegistry`], the set of recipes the decision engine draws
//! candidates from. Iteration is always in recipe-id order so that candidate
//! generation is deterministic.

use crate::builtin;
use crate::issue::Issue;
use crate::recipe::Recipe;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of available recipes, keyed by id
#[derive(Debug, Default, Clone)]
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Arc<dyn Recipe>>,
}

impl RecipeRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            recipes: BTreeMap::new(),
        }
    }

    /// Create registry with the built-in catalog
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for recipe in builtin::defaults() {
            // Built-in ids are distinct
            let _ = registry.register(recipe);
        }
        registry
    }

    /// Register a recipe
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the id is already taken
    pub fn register(&mut self, recipe: Arc<dyn Recipe>) -> Result<(), RegistryError> {
        let id = recipe.id().to_string();
        if self.recipes.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.recipes.insert(id, recipe);
        Ok(())
    }

    /// Look up a recipe by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Recipe>> {
        self.recipes.get(id)
    }

    /// Check if a recipe id is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.recipes.contains_key(id)
    }

    /// Recipes whose applicability predicate accepts `issue`, in id order
    pub fn applicable<'a>(
        &'a self,
        issue: &'a Issue,
    ) -> impl Iterator<Item = &'a Arc<dyn Recipe>> + 'a {
        self.recipes.values().filter(move |r| r.applies_to(issue))
    }

    /// All registered ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.recipes.keys().map(String::as_str).collect()
    }

    /// Iterate recipes in id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Recipe>> {
        self.recipes.values()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Errors from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A recipe with this id already exists
    #[error("recipe '{0}' already registered")]
    Duplicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::TrailingWhitespaceRecipe;
    use crate::issue::Severity;
    use remedy_artifact::WorkspacePath;

    #[test]
    fn builtins_registered_in_id_order() {
        let registry = RecipeRegistry::with_builtins();
        assert_eq!(
            registry.ids(),
            vec![
                "null-safe-member-access",
                "remove-debug-statement",
                "remove-unused-import",
                "trailing-whitespace",
            ]
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = RecipeRegistry::with_builtins();
        let err = registry
            .register(Arc::new(TrailingWhitespaceRecipe::new()))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("trailing-whitespace".to_string()));
    }

    #[test]
    fn applicable_filters_by_predicate() {
        let registry = RecipeRegistry::with_builtins();
        let file = WorkspacePath::new("a.py").unwrap();
        let issue = Issue::new("1", file.clone(), 3, Severity::Low, "whitespace");
        let ids: Vec<_> = registry.applicable(&issue).map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["trailing-whitespace"]);

        let none = Issue::new("2", file, 3, Severity::Low, "type-error");
        assert_eq!(registry.applicable(&none).count(), 0);
    }
}
