//! Shared tracing/logging initialization.
//!
//! Relay binaries log through `tracing`; this installs the subscriber once
//! per process with an env-filter and optional JSON output.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose log level follows the `--log-level` flag.
const SIPHON_TARGETS: [&str; 2] = ["siphon_relay", "siphon_core"];

/// Build the default filter directive for the given level,
/// e.g. `"siphon_relay=info,siphon_core=info"`.
pub fn default_filter(log_level: &str) -> String {
    SIPHON_TARGETS
        .iter()
        .map(|target| format!("{target}={log_level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `log_level` when set. When `log_json` is `true`,
/// structured JSON log lines are emitted instead of the human-readable format.
/// A second call in the same process is ignored.
pub fn init_tracing(log_level: &str, log_json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
