//! Error types for recipe storage and resolution

use thiserror::Error;

/// Result type for calculator operations
pub type Result<T> = std::result::Result<T, CalcError>;

#[derive(Error, Debug)]
pub enum CalcError {
    /// Root recipe has no stored counterpart
    #[error("recipe not found: {0}")]
    NotFound(String),

    /// Requested quantity or batch size is not a positive integer
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Recipe fails construction-time validation
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    /// Nested recipes loop back onto the current resolution path
    #[error("cycle detected in nested recipes: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// Multiplied quantities no longer fit in a u64
    #[error("quantity overflow while resolving {0}")]
    QuantityOverflow(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
