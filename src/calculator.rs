//! Bill-of-materials resolution for nested recipes
//!
//! Walks the nested-recipe graph depth-first with an explicit work stack,
//! turning every "units needed" into whole production runs and summing leaf
//! ingredients across all levels. Nodes live in an arena and point at their
//! parent by index, so cycle checks only ever look at the current path.

use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{CalcError, Result};
use crate::lookup::RecipeLookup;
use crate::models::Recipe;

/// Number of whole runs needed to produce `quantity` units in batches of `batch_size`
pub fn runs_needed(quantity: u64, batch_size: u32) -> u64 {
    debug_assert!(batch_size >= 1);
    quantity.div_ceil(u64::from(batch_size))
}

/// One nested production stage of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionStep {
    pub recipe_id: i64,
    pub recipe_name: String,
    /// Output units the parent stage consumes
    pub quantity_needed: u64,
    pub runs: u64,
    pub batch_size: u32,
    /// Surplus output left over after the last run
    pub waste: u64,
    /// Leaf ingredients consumed by a single run
    pub ingredients: Vec<(String, u64)>,
    /// Nested recipe outputs consumed by a single run
    pub components: Vec<(String, u64)>,
    pub sub_steps: Vec<ResolutionStep>,
}

impl ResolutionStep {
    pub fn total_output(&self) -> u64 {
        self.quantity_needed + self.waste
    }
}

/// Non-fatal problem found while resolving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A nested recipe id that the store could not find. The branch
    /// contributes nothing to the totals.
    DanglingReference { parent: String, missing_id: i64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DanglingReference { parent, missing_id } => write!(
                f,
                "'{}' references recipe {} which does not exist; its ingredients are not counted",
                parent, missing_id
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Leaf ingredient -> total quantity, in first-seen order
    pub leaf_totals: IndexMap<String, u64>,
    /// Nested stages of the root recipe, in `nested_recipes` order
    pub steps: Vec<ResolutionStep>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn total_waste(&self) -> u64 {
        fn walk(steps: &[ResolutionStep]) -> u64 {
            steps.iter().map(|s| s.waste + walk(&s.sub_steps)).sum()
        }
        walk(&self.steps)
    }

    pub fn step_count(&self) -> usize {
        fn walk(steps: &[ResolutionStep]) -> usize {
            steps.iter().map(|s| 1 + walk(&s.sub_steps)).sum()
        }
        walk(&self.steps)
    }

    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

struct Node {
    recipe: Recipe,
    quantity_needed: u64,
    runs: u64,
    parent: Option<usize>,
    children: Vec<usize>,
    components: Vec<(String, u64)>,
}

impl Node {
    fn new(recipe: Recipe, quantity_needed: u64, parent: Option<usize>) -> Self {
        Self {
            recipe,
            quantity_needed,
            runs: 0,
            parent,
            children: Vec::new(),
            components: Vec::new(),
        }
    }

    fn into_step(self, sub_steps: Vec<ResolutionStep>) -> Result<ResolutionStep> {
        let batch_size = self.recipe.output_count;
        let produced = self
            .runs
            .checked_mul(u64::from(batch_size))
            .ok_or_else(|| CalcError::QuantityOverflow(self.recipe.name.clone()))?;

        Ok(ResolutionStep {
            recipe_id: self.recipe.id.unwrap_or_default(),
            waste: produced - self.quantity_needed,
            quantity_needed: self.quantity_needed,
            runs: self.runs,
            batch_size,
            ingredients: self.recipe.ingredients.into_iter().collect(),
            components: self.components,
            recipe_name: self.recipe.name,
            sub_steps,
        })
    }
}

/// Resolve the recipe stored under `name`
pub fn resolve_by_name<L: RecipeLookup + ?Sized>(
    lookup: &L,
    name: &str,
    desired_quantity: u64,
) -> Result<Resolution> {
    check_quantity(desired_quantity)?;
    let recipe = lookup
        .fetch_recipe_by_name(name)?
        .ok_or_else(|| CalcError::NotFound(name.to_string()))?;
    resolve(lookup, &recipe, desired_quantity)
}

/// Compute leaf-ingredient totals and the nested step tree for
/// `desired_quantity` units of `recipe`.
///
/// Missing nested recipes are skipped and reported in
/// [`Resolution::diagnostics`]. A nested recipe that reappears on its own
/// ancestor path aborts with [`CalcError::CycleDetected`].
pub fn resolve<L: RecipeLookup + ?Sized>(
    lookup: &L,
    recipe: &Recipe,
    desired_quantity: u64,
) -> Result<Resolution> {
    check_quantity(desired_quantity)?;
    recipe.validate()?;

    info!(recipe = %recipe.name, quantity = desired_quantity, "resolving recipe");

    let mut nodes = vec![Node::new(recipe.clone(), desired_quantity, None)];
    let mut stack = vec![0usize];
    let mut leaf_totals: IndexMap<String, u64> = IndexMap::new();
    let mut diagnostics = Vec::new();

    while let Some(idx) = stack.pop() {
        let runs = runs_needed(nodes[idx].quantity_needed, nodes[idx].recipe.output_count);
        nodes[idx].runs = runs;

        let node = &nodes[idx];
        debug!(
            recipe = %node.recipe.name,
            needed = node.quantity_needed,
            runs,
            "expanding"
        );

        for (ingredient, per_run) in &node.recipe.ingredients {
            let total = per_run
                .checked_mul(runs)
                .ok_or_else(|| CalcError::QuantityOverflow(ingredient.clone()))?;
            let entry = leaf_totals.entry(ingredient.clone()).or_default();
            *entry = entry
                .checked_add(total)
                .ok_or_else(|| CalcError::QuantityOverflow(ingredient.clone()))?;
        }

        let nested: Vec<(i64, u64)> = node
            .recipe
            .nested_recipes
            .iter()
            .map(|(id, qty)| (*id, *qty))
            .collect();

        let mut children = Vec::with_capacity(nested.len());
        let mut components = Vec::with_capacity(nested.len());
        for (nested_id, per_run_output) in nested {
            let needed = per_run_output
                .checked_mul(runs)
                .ok_or_else(|| CalcError::QuantityOverflow(nodes[idx].recipe.name.clone()))?;

            let Some(mut child) = lookup.fetch_recipe_by_id(nested_id)? else {
                let parent = nodes[idx].recipe.name.clone();
                warn!(parent = %parent, missing_id = nested_id, "nested recipe not found, skipping");
                diagnostics.push(Diagnostic::DanglingReference {
                    parent,
                    missing_id: nested_id,
                });
                continue;
            };
            child.id.get_or_insert(nested_id);

            if let Some(path) = cycle_path(&nodes, idx, nested_id, &child.name) {
                return Err(CalcError::CycleDetected { path });
            }
            child.validate()?;

            components.push((child.name.clone(), per_run_output));
            nodes.push(Node::new(child, needed, Some(idx)));
            children.push(nodes.len() - 1);
        }

        stack.extend(children.iter().rev());
        nodes[idx].children = children;
        nodes[idx].components = components;
    }

    let steps = build_steps(nodes)?;
    let resolution = Resolution {
        leaf_totals,
        steps,
        diagnostics,
    };

    info!(
        recipe = %recipe.name,
        steps = resolution.step_count(),
        waste = resolution.total_waste(),
        dangling = resolution.diagnostics.len(),
        "resolution finished"
    );
    Ok(resolution)
}

fn check_quantity(desired_quantity: u64) -> Result<()> {
    if desired_quantity == 0 {
        return Err(CalcError::InvalidQuantity(
            "desired quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Names along the path from the first ancestor with `target_id` down to
/// `idx`, closed by `target_name`. `None` when `target_id` is not on the path.
fn cycle_path(nodes: &[Node], idx: usize, target_id: i64, target_name: &str) -> Option<Vec<String>> {
    let mut chain = Vec::new();
    let mut cursor = Some(idx);
    while let Some(i) = cursor {
        chain.push(i);
        cursor = nodes[i].parent;
    }
    chain.reverse();

    let start = chain
        .iter()
        .position(|i| nodes[*i].recipe.id == Some(target_id))?;
    let mut path: Vec<String> = chain[start..]
        .iter()
        .map(|i| nodes[*i].recipe.name.clone())
        .collect();
    path.push(target_name.to_string());
    Some(path)
}

/// Fold the arena into step trees. Children always sit at higher indices
/// than their parent, so one reverse sweep sees every child first.
fn build_steps(nodes: Vec<Node>) -> Result<Vec<ResolutionStep>> {
    let mut built: Vec<Option<ResolutionStep>> = Vec::with_capacity(nodes.len());
    built.resize_with(nodes.len(), || None);

    let mut nodes: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    for idx in (1..nodes.len()).rev() {
        let Some(node) = nodes[idx].take() else {
            continue;
        };
        let sub_steps = node
            .children
            .iter()
            .filter_map(|c| built[*c].take())
            .collect();
        built[idx] = Some(node.into_step(sub_steps)?);
    }

    let root_children = nodes
        .first()
        .and_then(|n| n.as_ref())
        .map(|n| n.children.clone())
        .unwrap_or_default();
    Ok(root_children
        .iter()
        .filter_map(|c| built[*c].take())
        .collect())
}

/// Format a step tree as indented lines, one per production stage
pub fn format_steps(steps: &[ResolutionStep], indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    for step in steps {
        let waste = if step.waste > 0 {
            format!("{}x {}", step.waste, step.recipe_name)
        } else {
            "None".to_string()
        };
        let inputs: Vec<String> = step
            .ingredients
            .iter()
            .chain(step.components.iter())
            .map(|(name, qty)| format!("{} {}", qty, name))
            .collect();

        output.push_str(&format!(
            "{}- {}x Recipe {} (Total Output: {} {}, Waste: {}, Ingredients: {})\n",
            prefix,
            step.runs,
            step.recipe_name,
            step.total_output(),
            step.recipe_name,
            waste,
            inputs.join(", ")
        ));
        output.push_str(&format_steps(&step.sub_steps, indent + 1));
    }

    output
}

/// Printable report of one resolution
#[derive(Debug)]
pub struct ResolutionSummary<'a> {
    pub target: &'a str,
    pub quantity: u64,
    pub resolution: &'a Resolution,
    pub verbose: bool,
}

impl fmt::Display for ResolutionSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "To make {} {}(s):", self.quantity, self.target)?;
        writeln!(f)?;

        if self.resolution.steps.is_empty() {
            writeln!(f, "No intermediate recipes needed.")?;
        } else {
            writeln!(f, "First make:")?;
            if self.verbose {
                write!(f, "{}", format_steps(&self.resolution.steps, 0))?;
            } else {
                for step in &self.resolution.steps {
                    writeln!(f, "- {}x Recipe {}", step.runs, step.recipe_name)?;
                }
            }
        }
        writeln!(f)?;

        let mut totals: Vec<_> = self.resolution.leaf_totals.iter().collect();
        totals.sort_by(|a, b| a.0.cmp(b.0));
        writeln!(f, "Total:")?;
        for (name, qty) in totals {
            writeln!(f, "- {} {}", qty, name)?;
        }

        let waste = self.resolution.total_waste();
        if waste > 0 {
            writeln!(f)?;
            writeln!(f, "Surplus from rounding: {} item(s)", waste)?;
        }

        if !self.resolution.is_complete() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for diagnostic in &self.resolution.diagnostics {
                writeln!(f, "  {}", diagnostic)?;
            }
        }

        Ok(())
    }
}
