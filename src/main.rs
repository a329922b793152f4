//! MC Calculator
//!
//! Works out the raw materials and intermediate crafts needed for nested
//! crafting recipes.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;

use mc_calculator::calculator::{self, ResolutionSummary};
use mc_calculator::import;
use mc_calculator::models::{CraftingBlock, Recipe};
use mc_calculator::{RecipeLookup, db};

#[derive(Parser)]
#[command(name = "mc-calculator")]
#[command(about = "Bill-of-materials calculator for nested crafting recipes")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "MC_CALC_DB", default_value = "minecraft_recipes.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Add a new recipe
    Add {
        /// Name of the crafted item (e.g., "Aqueous Accumulator")
        name: String,

        /// Number of items produced by one craft
        #[arg(short, long, default_value_t = 1)]
        output: u32,

        /// Mark the recipe as shaped
        #[arg(long)]
        shaped: bool,

        /// Crafting block the recipe is made at
        #[arg(short, long, default_value = "ctable3", value_parser = parse_block)]
        block: CraftingBlock,

        /// Grid slot contents for shaped recipes, as SLOT=NAME (repeatable)
        #[arg(long = "slot", value_parser = parse_slot)]
        slots: Vec<(u8, String)>,

        /// Raw ingredient per craft, as NAME=QTY (repeatable)
        #[arg(short, long = "ingredient", value_parser = parse_ingredient)]
        ingredients: Vec<(String, u64)>,

        /// Existing recipe used per craft, as ID=QTY (repeatable)
        #[arg(short, long = "nested", value_parser = parse_nested)]
        nested: Vec<(i64, u64)>,
    },

    /// List all recipes in the database
    List,

    /// Show details for a recipe
    Show {
        name: String,
    },

    /// Calculate ingredients for a recipe
    Calc {
        /// Recipe to craft
        name: String,

        /// Number of items wanted
        #[arg(short, long, default_value_t = 1)]
        quantity: u64,

        /// Show the full step tree with per-craft ingredients
        #[arg(short, long)]
        verbose: bool,
    },

    /// Import recipe definitions from a directory of JSON files
    Import {
        source_dir: PathBuf,

        /// Clear existing recipes before importing
        #[arg(long)]
        clear: bool,
    },

    /// Load sample recipes for testing
    LoadSample,

    /// Show credits
    Credits,
}

fn parse_ingredient(s: &str) -> Result<(String, u64), String> {
    let (name, qty) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=QTY, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("ingredient name must not be empty".to_string());
    }
    Ok((name.to_string(), parse_positive(qty)?))
}

fn parse_nested(s: &str) -> Result<(i64, u64), String> {
    let (id, qty) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=QTY, got '{}'", s))?;
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'{}' is not a recipe id", id))?;
    Ok((id, parse_positive(qty)?))
}

fn parse_block(s: &str) -> Result<CraftingBlock, String> {
    CraftingBlock::from_name(s).ok_or_else(|| format!("unknown crafting block '{}'", s))
}

fn parse_slot(s: &str) -> Result<(u8, String), String> {
    let (slot, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT=NAME, got '{}'", s))?;
    let slot = slot
        .trim()
        .parse::<u8>()
        .map_err(|_| format!("'{}' is not a slot number", slot))?;
    Ok((slot, name.trim().to_string()))
}

fn parse_positive(s: &str) -> Result<u64, String> {
    match s.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' is not a positive quantity", s)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Add {
            name,
            output,
            shaped,
            block,
            slots,
            ingredients,
            nested,
        } => {
            let mut recipe = Recipe::new(name, output)?
                .shaped(shaped)
                .with_crafting_block(block);
            for (slot, ingredient) in slots {
                if !block.slot_layout().contains(&slot) {
                    bail!("Slot {} does not exist on {}", slot, block.name());
                }
                recipe = recipe.with_slot(slot, ingredient);
            }
            for (ingredient, qty) in ingredients {
                recipe = recipe.with_ingredient(ingredient, qty);
            }
            for (id, qty) in nested {
                if conn.fetch_recipe_by_id(id)?.is_none() {
                    bail!("No recipe with ID {}. Run 'list' to see available recipes.", id);
                }
                recipe = recipe.with_nested(id, qty);
            }

            let id = db::insert_recipe(&conn, &recipe)?;
            println!("Saved recipe {} with ID {}", recipe.name, id);
        }

        Commands::List => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'add' or 'load-sample' first.");
            } else {
                println!("Available Recipes:");
                for r in recipes {
                    println!("{:>4}. {} (Output: {})", r.id, r.name, r.output_count);
                }
            }
        }

        Commands::Show { name } => {
            let Some(recipe) = db::fetch_recipe_by_name(&conn, &name)? else {
                bail!("Recipe '{}' not found", name);
            };
            println!("Recipe: {}", recipe.name);
            if let Some(id) = recipe.id {
                println!("  ID: {}", id);
            }
            println!("  Output: {}", recipe.output_count);
            println!("  Crafting block: {}", recipe.crafting_block.name());
            println!("  Shaped: {}", if recipe.shaped { "yes" } else { "no" });

            if !recipe.slots.is_empty() {
                println!("  Layout:");
                for row in recipe.crafting_block.slot_layout().chunks(3) {
                    let cells: Vec<&str> = row
                        .iter()
                        .map(|slot| recipe.slots.get(slot).map_or("-", String::as_str))
                        .collect();
                    println!("    [{}]", cells.join(" | "));
                }
            }

            if !recipe.ingredients.is_empty() {
                println!("  Ingredients:");
                for (ingredient, qty) in &recipe.ingredients {
                    println!("    {} {}", qty, ingredient);
                }
            }
            if !recipe.nested_recipes.is_empty() {
                println!("  Nested recipes:");
                for (id, qty) in &recipe.nested_recipes {
                    match conn.fetch_recipe_by_id(*id)? {
                        Some(nested) => println!("    {} {} (ID {})", qty, nested.name, id),
                        None => println!("    {} <missing recipe {}>", qty, id),
                    }
                }
            }
        }

        Commands::Calc {
            name,
            quantity,
            verbose,
        } => {
            let resolution = calculator::resolve_by_name(&conn, &name, quantity)?;
            let summary = ResolutionSummary {
                target: &name,
                quantity,
                resolution: &resolution,
                verbose,
            };
            print!("{}", summary);
        }

        Commands::Import { source_dir, clear } => {
            if clear {
                println!("Clearing existing recipes...");
                db::clear_recipes(&conn)?;
            }

            let stats = import::import_directory(&conn, &source_dir)?;
            println!("{}", stats);
        }

        Commands::LoadSample => {
            let count = load_sample_data(&conn)?;
            println!("Loaded {} sample recipes", count);
        }

        Commands::Credits => display_credits(),
    }

    Ok(())
}

fn display_credits() {
    println!("MC-CALCULATOR: nested crafting recipe calculator");
    println!("Run with RUST_LOG=debug to trace each resolution step.");
}

/// Replace stored recipes with a small set of wooden-tool recipes
fn load_sample_data(conn: &Connection) -> Result<usize> {
    db::clear_recipes(conn)?;
    info!("loading sample recipes");

    let plank = db::insert_recipe(
        conn,
        &Recipe::new("Wood Plank", 4)?.with_ingredient("Oak Log", 1),
    )?;
    let stick = db::insert_recipe(
        conn,
        &Recipe::new("Stick", 4)?
            .shaped(true)
            .with_slot(2, "Wood Plank")
            .with_slot(5, "Wood Plank")
            .with_nested(plank, 2),
    )?;
    db::insert_recipe(
        conn,
        &Recipe::new("Crafting Table", 1)?
            .shaped(true)
            .with_crafting_block(CraftingBlock::CraftingTable)
            .with_nested(plank, 4),
    )?;
    db::insert_recipe(conn, &Recipe::new("Chest", 1)?.shaped(true).with_nested(plank, 8))?;
    db::insert_recipe(
        conn,
        &Recipe::new("Torch", 4)?
            .shaped(true)
            .with_ingredient("Coal", 1)
            .with_nested(stick, 1),
    )?;
    db::insert_recipe(
        conn,
        &Recipe::new("Wooden Pickaxe", 1)?
            .shaped(true)
            .with_nested(plank, 3)
            .with_nested(stick, 2),
    )?;
    db::insert_recipe(conn, &Recipe::new("Ladder", 3)?.shaped(true).with_nested(stick, 7))?;

    Ok(db::list_recipes(conn)?.len())
}
