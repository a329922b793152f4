//! Bulk import of recipe definitions from JSON files
//!
//! Each `*.json` file holds one recipe definition or an array of them.
//! Nested recipes are referenced by name, since ids only exist once a recipe
//! is stored:
//!
//! ```json
//! { "name": "Torch", "output_count": 4, "ingredients": { "Coal": 1 }, "nested_recipes": { "Stick": 1 } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::error::{CalcError, Result};
use crate::models::{CraftingBlock, Recipe};

/// Recipe as written in an import file
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDefinition {
    pub name: String,
    #[serde(default = "default_output_count")]
    pub output_count: u32,
    #[serde(default)]
    pub crafting_block: CraftingBlock,
    #[serde(default)]
    pub shaped: bool,
    #[serde(default)]
    pub slots: BTreeMap<u8, String>,
    #[serde(default)]
    pub ingredients: IndexMap<String, u64>,
    /// Nested recipe name -> output units needed per run
    #[serde(default)]
    pub nested_recipes: IndexMap<String, u64>,
}

fn default_output_count() -> u32 {
    1
}

impl RecipeDefinition {
    fn into_recipe(self, nested_recipes: IndexMap<i64, u64>) -> Result<Recipe> {
        let mut recipe = Recipe::new(self.name, self.output_count)?
            .with_crafting_block(self.crafting_block)
            .shaped(self.shaped);
        recipe.slots = self.slots;
        recipe.ingredients = self.ingredients;
        recipe.nested_recipes = nested_recipes;
        Ok(recipe)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<RecipeDefinition>),
    One(RecipeDefinition),
}

/// Find all JSON files below `dir`, sorted by path
pub fn find_recipe_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CalcError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse one import file
pub fn parse_recipe_file(path: &Path) -> Result<Vec<RecipeDefinition>> {
    let content = fs::read_to_string(path)?;
    Ok(match serde_json::from_str(&content)? {
        DefinitionFile::Many(defs) => defs,
        DefinitionFile::One(def) => vec![def],
    })
}

/// Import every definition found below `dir`.
///
/// A definition is stored once all of its nested names exist, so files may
/// list recipes in any order. Names that are already stored are skipped.
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    let files = find_recipe_files(dir)?;
    info!(dir = %dir.display(), files = files.len(), "scanning for recipe files");

    let mut pending = Vec::new();
    for path in &files {
        match parse_recipe_file(path) {
            Ok(defs) => {
                debug!(file = %path.display(), recipes = defs.len(), "parsed recipe file");
                stats.files += 1;
                pending.extend(defs);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not parse recipe file");
                stats.errors += 1;
            }
        }
    }

    let imported = import_definitions(conn, pending, &mut stats)?;
    stats.imported = imported;
    Ok(stats)
}

/// Store definitions in dependency order, returning how many were inserted
pub fn import_definitions(
    conn: &Connection,
    mut pending: Vec<RecipeDefinition>,
    stats: &mut ImportStats,
) -> Result<usize> {
    let mut imported = 0;

    loop {
        let mut progressed = false;
        let mut waiting = Vec::new();

        for def in pending {
            if db::recipe_exists(conn, &def.name)? {
                debug!(recipe = %def.name, "already stored, skipping");
                stats.skipped += 1;
                progressed = true;
                continue;
            }

            let Some(nested) = resolve_nested_names(conn, &def)? else {
                waiting.push(def);
                continue;
            };

            let name = def.name.clone();
            match def
                .into_recipe(nested)
                .and_then(|r| db::insert_recipe(conn, &r))
            {
                Ok(id) => {
                    info!(recipe = %name, id, "imported recipe");
                    imported += 1;
                }
                Err(e @ (CalcError::InvalidRecipe(_) | CalcError::InvalidQuantity(_))) => {
                    warn!(recipe = %name, error = %e, "invalid recipe definition");
                    stats.errors += 1;
                }
                Err(e) => return Err(e),
            }
            progressed = true;
        }

        pending = waiting;
        if pending.is_empty() || !progressed {
            break;
        }
    }

    for def in pending {
        warn!(recipe = %def.name, "nested recipes never became available");
        stats.unresolved.push(def.name);
    }
    Ok(imported)
}

/// Map nested names to stored ids, or `None` while any of them is missing
fn resolve_nested_names(
    conn: &Connection,
    def: &RecipeDefinition,
) -> Result<Option<IndexMap<i64, u64>>> {
    let mut nested = IndexMap::with_capacity(def.nested_recipes.len());
    for (name, qty) in &def.nested_recipes {
        match db::fetch_recipe_by_name(conn, name)?.and_then(|r| r.id) {
            Some(id) => {
                nested.insert(id, *qty);
            }
            None => return Ok(None),
        }
    }
    Ok(Some(nested))
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Definitions whose nested recipes could not be found
    pub unresolved: Vec<String>,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes from {} files. Skipped: {}, Errors: {}",
            self.imported, self.files, self.skipped, self.errors
        )?;
        if !self.unresolved.is_empty() {
            write!(f, ", Unresolved: {}", self.unresolved.join(", "))?;
        }
        Ok(())
    }
}
