//! Transport publishers: schema registration and event delivery.
//!
//! A [`PublisherConnector`] turns a resolved [`Endpoint`] into a connected
//! [`EventPublisher`]. The gRPC implementation keeps one HTTP/2 channel per
//! publisher for its whole lifetime; a failed send does not close it.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::{debug, info};

use siphon_core::schema::{WireField, WireSchema, WireType};
use siphon_core::Value;
use siphon_proto::v1::attribute_value;
use siphon_proto::v1::event_receiver_service_client::EventReceiverServiceClient;
use siphon_proto::v1::{self as proto, PublishRequest, RegisterStreamRequest};

use crate::error::PublishError;
use crate::resolver::Endpoint;
use crate::tls::TransportSecurity;

/// Connected sink for one relay's events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Declare a stream's wire schema. Called once per exported stream,
    /// before any event of that stream is sent.
    async fn register_schema(
        &self,
        stream_id: &str,
        schema: &WireSchema,
    ) -> Result<(), PublishError>;

    /// Send one event with values in schema field order.
    async fn send(&self, stream_id: &str, values: &[Value]) -> Result<(), PublishError>;
}

/// Opens publishers to resolved endpoints.
#[async_trait]
pub trait PublisherConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn EventPublisher>, PublishError>;
}

/// Connector for the gRPC `EventReceiverService`.
#[derive(Debug, Clone)]
pub struct GrpcPublisherConnector {
    security: TransportSecurity,
    connect_timeout: Duration,
}

impl GrpcPublisherConnector {
    pub const fn new(security: TransportSecurity) -> Self {
        Self {
            security,
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl PublisherConnector for GrpcPublisherConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn EventPublisher>, PublishError> {
        let url = format!("{}://{}", self.security.scheme(), endpoint);
        let mut channel = Channel::from_shared(url)
            .map_err(|e| PublishError::Connection(e.to_string()))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(10));

        if let Some(tls) = self.security.client_tls_config()? {
            channel = channel
                .tls_config(tls)
                .map_err(|e| PublishError::Tls(e.to_string()))?;
        }

        let channel = channel.connect().await.map_err(|e| {
            debug!(error = ?e, "connection error details");
            PublishError::Connection(format!("{endpoint}: {e}"))
        })?;

        info!(endpoint = %endpoint, "Connected to event receiver");
        Ok(Arc::new(GrpcEventPublisher {
            client: EventReceiverServiceClient::new(channel),
        }))
    }
}

/// Publisher over a persistent gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcEventPublisher {
    client: EventReceiverServiceClient<Channel>,
}

#[async_trait]
impl EventPublisher for GrpcEventPublisher {
    async fn register_schema(
        &self,
        stream_id: &str,
        schema: &WireSchema,
    ) -> Result<(), PublishError> {
        let response = self
            .client
            .clone()
            .register_stream(RegisterStreamRequest {
                stream_id: stream_id.to_string(),
                schema: Some(schema_to_proto(schema)),
            })
            .await
            .map_err(|status| PublishError::Registration(status.message().to_string()))?;

        if !response.into_inner().accepted {
            return Err(PublishError::Registration(format!(
                "Receiver rejected schema {}",
                schema.wire_id()
            )));
        }
        Ok(())
    }

    async fn send(&self, stream_id: &str, values: &[Value]) -> Result<(), PublishError> {
        self.client
            .clone()
            .publish(PublishRequest {
                stream_id: stream_id.to_string(),
                values: values.iter().map(value_to_proto).collect(),
                sent_at: Some(prost_types::Timestamp::from(SystemTime::now())),
            })
            .await
            .map_err(|status| PublishError::Send(status.message().to_string()))?;
        Ok(())
    }
}

fn schema_to_proto(schema: &WireSchema) -> proto::WireSchema {
    proto::WireSchema {
        name: schema.name.clone(),
        version: schema.version.clone(),
        fields: schema.fields.iter().map(field_to_proto).collect(),
    }
}

fn field_to_proto(field: &WireField) -> proto::WireField {
    let wire_type = match field.wire_type {
        WireType::Int => proto::WireType::Int,
        WireType::Long => proto::WireType::Long,
        WireType::Float => proto::WireType::Float,
        WireType::Double => proto::WireType::Double,
        WireType::Bool => proto::WireType::Bool,
        WireType::String => proto::WireType::String,
    };
    proto::WireField {
        name: field.name.clone(),
        r#type: wire_type as i32,
    }
}

fn value_to_proto(value: &Value) -> proto::AttributeValue {
    let value = match value {
        Value::Int(v) => Some(attribute_value::Value::IntValue(*v)),
        Value::Long(v) => Some(attribute_value::Value::LongValue(*v)),
        Value::Float(v) => Some(attribute_value::Value::FloatValue(*v)),
        Value::Double(v) => Some(attribute_value::Value::DoubleValue(*v)),
        Value::Bool(v) => Some(attribute_value::Value::BoolValue(*v)),
        Value::String(v) => Some(attribute_value::Value::StringValue(v.clone())),
        Value::Null => None,
    };
    proto::AttributeValue { value }
}
