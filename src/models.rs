//! Data models for crafting recipes

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};

/// Longest recipe name accepted, in characters
pub const MAX_NAME_LEN: usize = 50;

/// Crafting station a recipe is made at. Carried through untouched by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CraftingBlock {
    #[default]
    #[serde(rename = "ctable3")]
    CraftingTable,
}

impl CraftingBlock {
    /// Name used in storage
    pub fn name(&self) -> &'static str {
        match self {
            CraftingBlock::CraftingTable => "ctable3",
        }
    }

    pub fn slot_layout(&self) -> &'static [u8] {
        match self {
            CraftingBlock::CraftingTable => &[1, 2, 3, 4, 5, 6, 7, 8, 9],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ctable3" => Some(CraftingBlock::CraftingTable),
            _ => None,
        }
    }
}

/// A production rule: one run consumes `ingredients` plus the output of
/// `nested_recipes` and yields `output_count` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Assigned by the store on insert
    #[serde(skip)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub crafting_block: CraftingBlock,
    pub output_count: u32,
    #[serde(default)]
    pub shaped: bool,
    #[serde(default)]
    pub slots: BTreeMap<u8, String>,
    /// Leaf ingredient name -> quantity per run
    #[serde(default)]
    pub ingredients: IndexMap<String, u64>,
    /// Nested recipe id -> output units needed per run of this recipe
    #[serde(default)]
    pub nested_recipes: IndexMap<i64, u64>,
}

impl Recipe {
    pub fn new(name: impl Into<String>, output_count: u32) -> Result<Self> {
        let recipe = Self {
            id: None,
            name: name.into(),
            crafting_block: CraftingBlock::default(),
            output_count,
            shaped: false,
            slots: BTreeMap::new(),
            ingredients: IndexMap::new(),
            nested_recipes: IndexMap::new(),
        };
        recipe.validate_header()?;
        Ok(recipe)
    }

    pub fn with_ingredient(mut self, name: impl Into<String>, quantity: u64) -> Self {
        self.ingredients.insert(name.into(), quantity);
        self
    }

    pub fn with_nested(mut self, recipe_id: i64, quantity: u64) -> Self {
        self.nested_recipes.insert(recipe_id, quantity);
        self
    }

    pub fn with_slot(mut self, slot: u8, ingredient: impl Into<String>) -> Self {
        self.slots.insert(slot, ingredient.into());
        self
    }

    pub fn with_crafting_block(mut self, block: CraftingBlock) -> Self {
        self.crafting_block = block;
        self
    }

    pub fn shaped(mut self, shaped: bool) -> Self {
        self.shaped = shaped;
        self
    }

    /// Check every invariant, including per-run quantities.
    pub fn validate(&self) -> Result<()> {
        self.validate_header()?;

        if let Some((name, _)) = self.ingredients.iter().find(|(_, qty)| **qty == 0) {
            return Err(CalcError::InvalidQuantity(format!(
                "ingredient '{}' of '{}' has zero quantity",
                name, self.name
            )));
        }
        if let Some((id, _)) = self.nested_recipes.iter().find(|(_, qty)| **qty == 0) {
            return Err(CalcError::InvalidQuantity(format!(
                "nested recipe {} of '{}' has zero quantity",
                id, self.name
            )));
        }
        Ok(())
    }

    fn validate_header(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CalcError::InvalidRecipe("name must not be empty".to_string()));
        }
        let len = self.name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(CalcError::InvalidRecipe(format!(
                "name is {} characters, limit is {}",
                len, MAX_NAME_LEN
            )));
        }
        if self.output_count < 1 {
            return Err(CalcError::InvalidQuantity(format!(
                "output count of '{}' must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Row returned when listing stored recipes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: i64,
    pub name: String,
    pub output_count: u32,
}
