//! Database schema and operations

use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::Result;
use crate::lookup::RecipeLookup;
use crate::models::{Recipe, RecipeSummary};

const NESTED_MIGRATION_FLAG: &str = "nested_recipes_migration_done";

/// Initialize the database schema and run pending migrations
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- `ingredients` holds the whole recipe as a JSON document
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            ingredients TEXT NOT NULL,
            shaped BOOLEAN NOT NULL,
            crafting_block TEXT NOT NULL,
            output_count INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS flags (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);
        "#,
    )?;

    let migrated: Option<String> = conn
        .query_row(
            "SELECT value FROM flags WHERE key = ?1",
            [NESTED_MIGRATION_FLAG],
            |row| row.get(0),
        )
        .optional()?;

    if migrated.is_none() {
        migrate_nested_recipes(conn)?;
    }
    Ok(())
}

/// Move nested recipe references out of the recipe document into their own column.
/// Runs in one transaction so a bad document leaves the table untouched.
fn migrate_nested_recipes(conn: &Connection) -> Result<()> {
    info!("migrating nested recipes into nested_recipes_json");

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "ALTER TABLE recipes ADD COLUMN nested_recipes_json TEXT DEFAULT '{}'",
        [],
    )?;

    let rows: Vec<(i64, String)> = {
        let mut stmt = tx.prepare("SELECT id, ingredients FROM recipes")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for (id, document) in rows {
        let value: serde_json::Value = serde_json::from_str(&document)?;
        let nested = value
            .get("nested_recipes")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        tx.execute(
            "UPDATE recipes SET nested_recipes_json = ?1 WHERE id = ?2",
            (serde_json::to_string(&nested)?, id),
        )?;
        debug!(recipe_id = id, "migrated nested recipes");
    }

    tx.execute(
        "INSERT INTO flags (key, value) VALUES (?1, ?2)",
        (NESTED_MIGRATION_FLAG, "true"),
    )?;
    tx.commit()?;
    Ok(())
}

/// Insert a recipe and return the id assigned to it
pub fn insert_recipe(conn: &Connection, recipe: &Recipe) -> Result<i64> {
    recipe.validate()?;

    conn.execute(
        "INSERT INTO recipes (name, ingredients, shaped, crafting_block, output_count, nested_recipes_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &recipe.name,
            recipe.to_json()?,
            recipe.shaped,
            recipe.crafting_block.name(),
            recipe.output_count,
            serde_json::to_string(&recipe.nested_recipes)?,
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(recipe = %recipe.name, id, "saved recipe");
    Ok(id)
}

/// Get a recipe by id
pub fn fetch_recipe_by_id(conn: &Connection, recipe_id: i64) -> Result<Option<Recipe>> {
    let row: Option<RecipeRow> = conn
        .query_row(
            "SELECT id, ingredients, nested_recipes_json FROM recipes WHERE id = ?1",
            [recipe_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    row.map(decode_row).transpose()
}

/// Get a recipe by name. With duplicate names the oldest recipe wins.
pub fn fetch_recipe_by_name(conn: &Connection, name: &str) -> Result<Option<Recipe>> {
    let row: Option<RecipeRow> = conn
        .query_row(
            "SELECT id, ingredients, nested_recipes_json FROM recipes
             WHERE name = ?1 ORDER BY id LIMIT 1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    row.map(decode_row).transpose()
}

/// id, recipe document, nested_recipes_json
type RecipeRow = (i64, String, Option<String>);

fn decode_row((id, document, nested): RecipeRow) -> Result<Recipe> {
    let mut recipe = Recipe::from_json(&document)?;
    if let Some(nested) = nested {
        recipe.nested_recipes = serde_json::from_str::<IndexMap<i64, u64>>(&nested)?;
    }
    recipe.id = Some(id);
    Ok(recipe)
}

pub fn recipe_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM recipes WHERE name = ?1 LIMIT 1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// List all recipes in the database
pub fn list_recipes(conn: &Connection) -> Result<Vec<RecipeSummary>> {
    let mut stmt = conn.prepare("SELECT id, name, output_count FROM recipes ORDER BY id")?;

    let rows = stmt.query_map([], |row| {
        Ok(RecipeSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            output_count: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Remove every stored recipe
pub fn clear_recipes(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM recipes", [])?;
    Ok(())
}

impl RecipeLookup for Connection {
    fn fetch_recipe_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        fetch_recipe_by_id(self, id)
    }

    fn fetch_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        fetch_recipe_by_name(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_save_and_fetch_recipe() {
        let conn = setup_test_db();
        let recipe = Recipe::new("Test Recipe", 1)
            .unwrap()
            .with_ingredient("Ingredient1", 1)
            .with_ingredient("Ingredient2", 2);

        let id = insert_recipe(&conn, &recipe).unwrap();
        let fetched = fetch_recipe_by_name(&conn, "Test Recipe").unwrap().unwrap();

        assert_eq!(fetched.id, Some(id));
        assert_eq!(fetched.name, recipe.name);
        assert_eq!(fetched.ingredients, recipe.ingredients);
        assert_eq!(fetch_recipe_by_id(&conn, id).unwrap(), Some(fetched));
    }

    #[test]
    fn test_fetch_missing() {
        let conn = setup_test_db();
        assert!(fetch_recipe_by_id(&conn, 5).unwrap().is_none());
        assert!(fetch_recipe_by_name(&conn, "Nope").unwrap().is_none());
        assert!(!recipe_exists(&conn, "Nope").unwrap());
    }

    #[test]
    fn test_nested_order_survives_storage() {
        let conn = setup_test_db();
        let stick = insert_recipe(&conn, &Recipe::new("Stick", 4).unwrap()).unwrap();
        let coal = insert_recipe(&conn, &Recipe::new("Charcoal", 1).unwrap()).unwrap();
        let torch = Recipe::new("Torch", 4).unwrap().with_nested(coal, 1).with_nested(stick, 1);
        let id = insert_recipe(&conn, &torch).unwrap();

        let fetched = fetch_recipe_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.nested_recipes.keys().copied().collect::<Vec<_>>(), vec![coal, stick]);
    }

    #[test]
    fn test_duplicate_names_fetch_oldest() {
        let conn = setup_test_db();
        let first = insert_recipe(&conn, &Recipe::new("Torch", 4).unwrap()).unwrap();
        insert_recipe(&conn, &Recipe::new("Torch", 8).unwrap()).unwrap();
        assert_eq!(fetch_recipe_by_name(&conn, "Torch").unwrap().unwrap().id, Some(first));
    }

    #[test]
    fn test_insert_rejects_invalid_recipe() {
        let conn = setup_test_db();
        let mut recipe = Recipe::new("Broken", 1).unwrap();
        recipe.output_count = 0;
        assert!(insert_recipe(&conn, &recipe).is_err());
        assert!(list_recipes(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_list_and_clear() {
        let conn = setup_test_db();
        insert_recipe(&conn, &Recipe::new("Stick", 4).unwrap()).unwrap();
        insert_recipe(&conn, &Recipe::new("Chest", 1).unwrap()).unwrap();

        let listed = list_recipes(&conn).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Stick");
        assert_eq!(listed[0].output_count, 4);

        clear_recipes(&conn).unwrap();
        assert!(list_recipes(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = setup_test_db();
        insert_recipe(&conn, &Recipe::new("Stick", 4).unwrap()).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(list_recipes(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_migration_can_be_retried() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE recipes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ingredients TEXT NOT NULL,
                shaped BOOLEAN NOT NULL,
                crafting_block TEXT NOT NULL,
                output_count INTEGER NOT NULL DEFAULT 1
            );
            INSERT INTO recipes VALUES (1, 'Stick', '{"name":"Stick","output_count":4,"ingredients":{"Wood Plank":2}}', 0, 'ctable3', 4);
            INSERT INTO recipes VALUES (2, 'Broken', 'not json', 0, 'ctable3', 1);
            "#,
        )
        .unwrap();

        assert!(matches!(init_schema(&conn), Err(crate::error::CalcError::Json(_))));

        conn.execute("DELETE FROM recipes WHERE id = 2", []).unwrap();
        init_schema(&conn).unwrap();

        let stick = fetch_recipe_by_name(&conn, "Stick").unwrap().unwrap();
        assert!(stick.nested_recipes.is_empty());
        assert_eq!(stick.ingredients["Wood Plank"], 2);
    }

    #[test]
    fn test_migration_backfills_nested_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE recipes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ingredients TEXT NOT NULL,
                shaped BOOLEAN NOT NULL,
                crafting_block TEXT NOT NULL,
                output_count INTEGER NOT NULL DEFAULT 1
            );
            INSERT INTO recipes VALUES (1, 'Stick', '{"name":"Stick","crafting_block":"ctable3","output_count":4,"shaped":false,"slots":{},"ingredients":{"Wood Plank":2}}', 0, 'ctable3', 4);
            INSERT INTO recipes VALUES (2, 'Torch', '{"name":"Torch","crafting_block":"ctable3","output_count":4,"shaped":false,"slots":{},"ingredients":{"Coal":1},"nested_recipes":{"1":1}}', 0, 'ctable3', 4);
            "#,
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let nested: String = conn
            .query_row("SELECT nested_recipes_json FROM recipes WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nested, r#"{"1":1}"#);

        let torch = fetch_recipe_by_name(&conn, "Torch").unwrap().unwrap();
        let res = calculator::resolve(&conn, &torch, 4).unwrap();
        assert_eq!(res.leaf_totals["Coal"], 1);
        assert_eq!(res.leaf_totals["Wood Plank"], 2);
    }
}
