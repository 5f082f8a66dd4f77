//! Relay error types.

use std::time::Duration;

use siphon_core::SchemaError;

/// Errors reported by an endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Discovery connection error: {0}")]
    Connection(String),

    #[error("Discovery request failed: {0}")]
    Rpc(String),

    #[error("No publisher endpoint assigned to execution plan '{0}'")]
    NotFound(String),

    #[error("Invalid endpoint in discovery response: {0}")]
    InvalidEndpoint(String),

    #[error("Discovery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Discovery response was dropped before completion")]
    Dropped,
}

/// Errors raised by a transport publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Schema registration error: {0}")]
    Registration(String),

    #[error("Send error: {0}")]
    Send(String),
}

/// Errors that abort relay initialization.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Plan(#[from] siphon_core::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Relay initialization requires a Tokio runtime")]
    NoRuntime,
}
