//! Siphon Protocol Buffers
//!
//! Generated protobuf code for the services a relay talks to.
//!
//! This crate contains:
//! - `DiscoveryService` for resolving the receiving endpoint of a plan
//! - `EventReceiverService` for schema registration and event delivery

#![allow(clippy::derive_partial_eq_without_eq)]

/// Siphon v1 API definitions.
pub mod v1 {
    tonic::include_proto!("siphon.v1");
}

pub use v1::*;

// Re-export prost_types for downstream crates that need Timestamp conversion
pub use prost_types;
