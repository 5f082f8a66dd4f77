//! Error types for Siphon core library.

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type alias using Siphon Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Siphon operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed stream or partition definition
    #[error("Invalid definition: {0}")]
    Definition(String),

    /// Query whose output stream cannot be inferred
    #[error("Invalid query: {0}")]
    Query(String),

    /// Stream schema with no wire representation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// NDJSON event-line parsing error
    #[error("Failed to parse event line: {0}")]
    EventParse(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
