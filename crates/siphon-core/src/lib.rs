//! Siphon Core Library
//!
//! Shared functionality for Siphon components:
//! - Stream, partition and query definition parsing
//! - Translation of stream schemas into flat wire schemas
//! - Event values and NDJSON event-line parsing
//! - Relay configuration loading
//! - Common error types

pub mod config;
pub mod definition;
pub mod error;
pub mod event;
pub mod schema;
pub mod tracing_init;

pub use config::RelayConfig;
pub use definition::{AttributeType, StreamDefinition, StreamRegistry};
pub use error::{Error, Result};
pub use event::Value;
pub use schema::{SchemaError, SchemaMap, WireSchema, WireType};
