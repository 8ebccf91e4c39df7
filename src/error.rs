//! # Error types
//!
//! Library-level errors for routing, reference storage and message history.
//! The binary wraps these in `Box<dyn Error>` at the edges.

use thiserror::Error;

/// Errors raised by the router, the reference store and the history layer.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The embedding backend failed (model missing, inference error, service down).
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Candle tensor/model error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Vector length did not match the store dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The ANN index rejected an insert or failed to build.
    #[error("Index error: {0}")]
    Index(&'static str),

    /// No route with this name exists in the router.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// A route or routing config failed validation.
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// A router with the same name but a different definition is already persisted.
    #[error("Router '{0}' already exists with a different definition; rebuild with overwrite")]
    ExistingRouter(String),

    /// No persisted router with this name.
    #[error("Router not found: {0}")]
    RouterNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::error::EncodeError> for RouterError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RouterError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RouterError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RouterError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
