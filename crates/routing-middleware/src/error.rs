//! Routing error types.

use thiserror::Error;

/// Routing error type.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// Transformer type this engine does not know
    #[error("Transformer of type \"{0}\" is unsupported")]
    UnsupportedTransformer(String),

    /// Transformer is missing the config section it needs
    #[error("Transformer \"{transformer}\" is missing its {section} config")]
    MissingConfig {
        transformer: String,
        section: &'static str,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RoutingError.
pub type RoutingResult<T> = Result<T, RoutingError>;
