//! Bill-of-materials calculator for nested crafting recipes
//!
//! Given a recipe whose components may themselves be recipes, works out how
//! many runs of each intermediate recipe are needed, the total raw
//! ingredients, and the surplus produced by rounding up to whole runs.

pub mod calculator;
pub mod db;
pub mod error;
pub mod import;
pub mod lookup;
pub mod models;

pub use calculator::{Diagnostic, Resolution, ResolutionStep, resolve, resolve_by_name};
pub use error::{CalcError, Result};
pub use lookup::{MemoryStore, RecipeLookup};
pub use models::{CraftingBlock, Recipe};
