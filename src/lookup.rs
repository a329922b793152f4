//! Recipe lookup used by the resolver
//!
//! The resolver never holds live references between recipes. Nested recipes
//! are fetched by id through a [`RecipeLookup`] as the traversal reaches them.

use indexmap::IndexMap;

use crate::error::Result;
use crate::models::Recipe;

/// Read-only access to stored recipes. `Ok(None)` means "no such recipe";
/// `Err` is reserved for the store itself failing.
pub trait RecipeLookup {
    fn fetch_recipe_by_id(&self, id: i64) -> Result<Option<Recipe>>;

    fn fetch_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>>;
}

impl<T: RecipeLookup + ?Sized> RecipeLookup for &T {
    fn fetch_recipe_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        (**self).fetch_recipe_by_id(id)
    }

    fn fetch_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        (**self).fetch_recipe_by_name(name)
    }
}

/// In-memory store with sequential ids starting at 1
#[derive(Debug, Default)]
pub struct MemoryStore {
    recipes: IndexMap<i64, Recipe>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a recipe and return its assigned id
    pub fn insert(&mut self, mut recipe: Recipe) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        recipe.id = Some(id);
        self.recipes.insert(id, recipe);
        id
    }

    /// Overwrite the recipe stored under `id`, keeping the id
    pub fn replace(&mut self, id: i64, mut recipe: Recipe) {
        recipe.id = Some(id);
        self.recipes.insert(id, recipe);
    }
}

impl RecipeLookup for MemoryStore {
    fn fetch_recipe_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        Ok(self.recipes.get(&id).cloned())
    }

    fn fetch_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        Ok(self.recipes.values().find(|r| r.name == name).cloned())
    }
}
