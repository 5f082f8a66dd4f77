//! Siphon Relay
//!
//! Stand-alone relay: resolves the publisher endpoint of an execution plan,
//! then forwards NDJSON events read from stdin to the receiving service.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use siphon_core::config::load_config;
use siphon_core::event::parse_event_line;
use siphon_core::tracing_init::init_tracing;

use siphon_relay::{
    EndpointResolver, GrpcEndpointResolver, GrpcPublisherConnector, PublisherConnector,
    RelayStage, TransportSecurity,
};

#[derive(Parser, Debug)]
#[command(name = "siphon-relay")]
#[command(
    version,
    about = "Siphon relay - forwards plan output events to a discovered receiver"
)]
struct Args {
    /// Relay configuration file (TOML).
    #[arg(long, env = "SIPHON_CONFIG")]
    config: PathBuf,

    /// Override the discovery service host.
    #[arg(long)]
    discovery_host: Option<String>,

    /// Override the discovery service port.
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Log level for siphon crates (ignored when `RUST_LOG` is set).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    let mut config = load_config(&args.config)?;
    if let Some(host) = args.discovery_host {
        config.discovery_host = host;
    }
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        plan = %config.execution_plan,
        tenant = config.tenant_id,
        discovery = %config.discovery_addr(),
        streams = ?config.exported_streams,
        "Starting siphon-relay"
    );

    let security = config
        .trust_store_path
        .clone()
        .map_or_else(TransportSecurity::plaintext, TransportSecurity::with_trust_store);
    let resolver: Arc<dyn EndpointResolver> = Arc::new(GrpcEndpointResolver::new(
        &config.discovery_host,
        config.discovery_port,
    ));
    let connector: Arc<dyn PublisherConnector> = Arc::new(GrpcPublisherConnector::new(security));

    let stage = RelayStage::new(config, resolver, connector);
    stage.prepare()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match parse_event_line(&line) {
                        Ok(event) => {
                            stage.on_event(&event.stream, &event.data).await;
                        }
                        Err(e) => warn!(error = %e, "Skipping malformed event line"),
                    },
                    None => {
                        info!("End of input");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    let stats = stage.stats();
    info!(
        state = ?stage.state(),
        sent = stats.sent,
        dropped_not_ready = stats.dropped_not_ready,
        dropped_unknown_stream = stats.dropped_unknown_stream,
        dropped_malformed = stats.dropped_malformed,
        send_failures = stats.send_failures,
        "Relay stopped"
    );
    Ok(())
}
