//! Relay stage: forwards output events of an execution plan to the
//! receiving service discovered at runtime.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --init--> Initializing --endpoint + connect--> Ready
//!                               |
//!                               +--failure / timeout--------> Degraded
//! ```
//!
//! `Ready` and `Degraded` are terminal for an instance. Events arriving in
//! any state other than `Ready` are dropped, never queued.
//!
//! The publisher lives in a single-assignment cell that is filled only after
//! the connection is open and every exported schema is registered, so a
//! dispatcher that sees a publisher also sees all its registrations.
//! Dispatch is additionally gated on `Ready`, so a publisher that finishes
//! connecting after the stage degraded is never used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use siphon_core::{RelayConfig, SchemaMap, StreamRegistry, Value};

use crate::error::{PublishError, RelayError, ResolveError};
use crate::publisher::{EventPublisher, PublisherConnector};
use crate::resolver::{Endpoint, EndpointResolver, Resolution, ResolveRequest, local_address};
use crate::throughput::ThroughputMeter;

/// Lifecycle state of a relay stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Uninitialized,
    Initializing,
    Ready,
    Degraded,
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// No publisher attached yet (or ever).
    NotReady,
    /// Stream is not exported by this relay.
    UnknownStream,
    /// Values do not fit the stream's wire schema.
    Malformed,
    /// The transport rejected the event.
    SendFailed,
}

/// Snapshot of per-outcome event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub sent: u64,
    pub dropped_not_ready: u64,
    pub dropped_unknown_stream: u64,
    pub dropped_malformed: u64,
    pub send_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped_not_ready: AtomicU64,
    dropped_unknown_stream: AtomicU64,
    dropped_malformed: AtomicU64,
    send_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RelayStats {
        RelayStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped_not_ready: self.dropped_not_ready.load(Ordering::Relaxed),
            dropped_unknown_stream: self.dropped_unknown_stream.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    config: RelayConfig,
    resolver: Arc<dyn EndpointResolver>,
    connector: Arc<dyn PublisherConnector>,
    state: Mutex<RelayState>,
    schemas: OnceLock<SchemaMap>,
    publisher: OnceCell<Arc<dyn EventPublisher>>,
    throughput: ThroughputMeter,
    counters: Counters,
}

/// Handle to a relay stage. Clones share the same stage.
#[derive(Clone)]
pub struct RelayStage {
    inner: Arc<Inner>,
}

impl RelayStage {
    pub fn new(
        config: RelayConfig,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn PublisherConnector>,
    ) -> Self {
        let throughput = ThroughputMeter::new(config.throughput_batch);
        Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                connector,
                state: Mutex::new(RelayState::Uninitialized),
                schemas: OnceLock::new(),
                publisher: OnceCell::new(),
                throughput,
                counters: Counters::default(),
            }),
        }
    }

    pub fn state(&self) -> RelayState {
        *self.lock_state()
    }

    pub fn stats(&self) -> RelayStats {
        self.inner.counters.snapshot()
    }

    /// Eager initialization, called by the host once before dispatch starts.
    pub fn prepare(&self) -> Result<(), RelayError> {
        debug!(plan = %self.inner.config.execution_plan, "Preparing relay stage");
        self.init()
    }

    /// Build wire schemas and request the publisher endpoint.
    ///
    /// Runs once per instance; later calls return `Ok(())` without effect.
    /// Returns as soon as the request is issued. A definition or schema
    /// error aborts initialization and leaves the stage `Degraded`.
    pub fn init(&self) -> Result<(), RelayError> {
        {
            let mut state = self.lock_state();
            if *state != RelayState::Uninitialized {
                return Ok(());
            }
            *state = RelayState::Initializing;
        }

        let config = &self.inner.config;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.degrade();
                return Err(RelayError::NoRuntime);
            }
        };

        let schemas = match build_schemas(config) {
            Ok(schemas) => schemas,
            Err(e) => {
                error!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    error = %e,
                    "Relay initialization failed"
                );
                self.degrade();
                return Err(e);
            }
        };
        if self.inner.schemas.set(schemas).is_err() {
            warn!(plan = %config.execution_plan, "Wire schemas were already built");
        }
        self.inner.throughput.reset();

        let request = ResolveRequest {
            plan_name: config.execution_plan.clone(),
            tenant_id: config.tenant_id,
            timeout: config.resolve_timeout(),
            caller_address: local_address(),
        };
        info!(
            plan = %config.execution_plan,
            tenant = config.tenant_id,
            caller = %request.caller_address,
            "Resolving publisher endpoint"
        );
        let resolution = self.inner.resolver.resolve(request);

        let stage = self.clone();
        runtime.spawn(async move { stage.await_resolution(resolution).await });
        Ok(())
    }

    async fn await_resolution(&self, resolution: Resolution) {
        let timeout = self.inner.config.resolve_timeout();
        let outcome = match tokio::time::timeout(timeout, resolution).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ResolveError::Dropped),
            Err(_) => Err(ResolveError::Timeout(timeout)),
        };
        match outcome {
            Ok(endpoint) => self.on_resolution_success(endpoint).await,
            Err(e) => self.on_resolution_failure(&e),
        }
    }

    /// Attach a publisher for `endpoint`: connect, register every exported
    /// schema, then become `Ready`.
    ///
    /// At most one publisher is ever attached. A callback arriving after a
    /// publisher exists, or after the stage degraded, is logged and ignored.
    pub async fn on_resolution_success(&self, endpoint: Endpoint) {
        let config = &self.inner.config;
        let state = self.state();
        if state == RelayState::Degraded || self.inner.publisher.initialized() {
            warn!(
                plan = %config.execution_plan,
                tenant = config.tenant_id,
                endpoint = %endpoint,
                ?state,
                "Ignoring late endpoint resolution"
            );
            return;
        }
        let Some(schemas) = self.inner.schemas.get() else {
            warn!(
                plan = %config.execution_plan,
                endpoint = %endpoint,
                "Endpoint resolved before initialization, ignoring"
            );
            return;
        };

        let connector = &self.inner.connector;
        let attached = self
            .inner
            .publisher
            .get_or_try_init(|| async {
                let publisher = connector.connect(&endpoint).await?;
                for (stream_id, schema) in schemas.iter() {
                    debug!(
                        plan = %config.execution_plan,
                        stream = stream_id,
                        "Registering stream definition with publisher"
                    );
                    publisher.register_schema(stream_id, schema).await?;
                }
                Ok::<_, PublishError>(publisher)
            })
            .await;

        let mut state = self.lock_state();
        match attached {
            Ok(_) if *state == RelayState::Degraded => {
                warn!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    endpoint = %endpoint,
                    "Relay degraded while connecting, publisher left unused"
                );
            }
            Ok(_) if *state == RelayState::Ready => {
                warn!(
                    plan = %config.execution_plan,
                    endpoint = %endpoint,
                    "Publisher already attached, duplicate resolution ignored"
                );
            }
            Ok(_) => {
                *state = RelayState::Ready;
                info!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    endpoint = %endpoint,
                    streams = schemas.len(),
                    "Relay connected to event receiver"
                );
            }
            Err(e) => {
                if *state != RelayState::Ready {
                    *state = RelayState::Degraded;
                }
                error!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    endpoint = %endpoint,
                    error = %e,
                    "Error while creating event publisher"
                );
            }
        }
    }

    /// Record a failed or timed-out resolution. No retry is attempted.
    pub fn on_resolution_failure(&self, error: &ResolveError) {
        let config = &self.inner.config;
        let mut state = self.lock_state();
        if *state == RelayState::Ready {
            warn!(
                plan = %config.execution_plan,
                error = %error,
                "Resolution failure after publisher attached, ignoring"
            );
            return;
        }
        *state = RelayState::Degraded;
        error!(
            plan = %config.execution_plan,
            tenant = config.tenant_id,
            error = %error,
            "Publisher endpoint resolution failed, events will be dropped"
        );
    }

    /// Forward one event of `stream_id`.
    ///
    /// Initializes the stage first if the host skipped [`prepare`](Self::prepare).
    /// Every failure is handled here: the event is dropped and logged.
    pub async fn on_event(&self, stream_id: &str, values: &[Value]) -> Dispatch {
        let config = &self.inner.config;
        if self.state() == RelayState::Uninitialized {
            if let Err(e) = self.init() {
                error!(plan = %config.execution_plan, error = %e, "Lazy initialization failed");
            }
        }

        let publisher = match (self.state(), self.inner.publisher.get()) {
            (RelayState::Ready, Some(publisher)) => publisher,
            _ => {
                self.inner
                    .counters
                    .dropped_not_ready
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    stream = stream_id,
                    "Dropping the event since the data publisher is not yet initialized"
                );
                return Dispatch::NotReady;
            }
        };

        let Some(schema) = self.inner.schemas.get().and_then(|s| s.get(stream_id)) else {
            self.inner
                .counters
                .dropped_unknown_stream
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                plan = %config.execution_plan,
                tenant = config.tenant_id,
                stream = stream_id,
                values = ?values,
                "Event received for unknown stream, discarding"
            );
            return Dispatch::UnknownStream;
        };

        let values = match schema.conform(values) {
            Ok(values) => values,
            Err(e) => {
                self.inner
                    .counters
                    .dropped_malformed
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    plan = %config.execution_plan,
                    tenant = config.tenant_id,
                    stream = stream_id,
                    error = %e,
                    "Event does not match the stream definition, discarding"
                );
                return Dispatch::Malformed;
            }
        };

        debug!(plan = %config.execution_plan, stream = stream_id, values = ?values, "Publishing event");
        if let Err(e) = publisher.send(stream_id, &values).await {
            self.inner
                .counters
                .send_failures
                .fetch_add(1, Ordering::Relaxed);
            error!(
                plan = %config.execution_plan,
                tenant = config.tenant_id,
                stream = stream_id,
                error = %e,
                "Error while publishing event"
            );
            return Dispatch::SendFailed;
        }

        self.inner.counters.sent.fetch_add(1, Ordering::Relaxed);
        if let Some(sample) = self.inner.throughput.record() {
            info!(
                plan = %config.execution_plan,
                events = sample.events,
                elapsed_secs = sample.elapsed.as_secs_f64(),
                events_per_sec = sample.events_per_sec,
                "Processed {} events in {:.3} seconds, throughput : {:.1} events/sec",
                sample.events,
                sample.elapsed.as_secs_f64(),
                sample.events_per_sec
            );
        }
        Dispatch::Sent
    }

    fn degrade(&self) {
        *self.lock_state() = RelayState::Degraded;
    }

    fn lock_state(&self) -> MutexGuard<'_, RelayState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn build_schemas(config: &RelayConfig) -> Result<SchemaMap, RelayError> {
    let registry = StreamRegistry::from_plan(&config.stream_definitions, &config.queries)?;
    debug!(
        plan = %config.execution_plan,
        streams = registry.stream_count(),
        "Execution plan definitions parsed"
    );
    let schemas = SchemaMap::build(&registry, &config.exported_streams)?;
    for (stream, schema) in schemas.iter() {
        let partitions: Vec<_> = registry
            .partitions_of(stream)
            .map(|p| p.id.as_str())
            .collect();
        debug!(
            plan = %config.execution_plan,
            stream,
            wire_id = %schema.wire_id(),
            fields = schema.fields.len(),
            partitions = ?partitions,
            "Built wire schema"
        );
    }
    Ok(schemas)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "stage_tests.rs"]
mod tests;
