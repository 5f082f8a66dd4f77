//! Siphon Relay Library
//!
//! The egress stage of a stream-processing pipeline:
//! - Endpoint discovery through the manager's `DiscoveryService`
//! - Transport publishers that register wire schemas and send events
//! - The relay stage state machine tying both to event dispatch
//! - Throughput sampling of successfully sent events

pub mod error;
pub mod publisher;
pub mod resolver;
pub mod stage;
pub mod throughput;
pub mod tls;

pub use error::{PublishError, RelayError, ResolveError};
pub use publisher::{EventPublisher, GrpcPublisherConnector, PublisherConnector};
pub use resolver::{Endpoint, EndpointResolver, GrpcEndpointResolver, ResolveRequest};
pub use stage::{Dispatch, RelayStage, RelayState, RelayStats};
pub use throughput::{ThroughputMeter, ThroughputSample};
pub use tls::TransportSecurity;
