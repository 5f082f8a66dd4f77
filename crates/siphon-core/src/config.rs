//! Relay configuration.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. TOML config file
//! 3. Environment variables
//!
//! CLI flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Tenant id used when the plan does not belong to a specific tenant.
pub const SUPER_TENANT_ID: i32 = -1234;

/// Successful sends between throughput measurements.
pub const DEFAULT_THROUGHPUT_BATCH: u64 = 10_000;

/// Complete configuration of one relay instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Execution plan this relay publishes for.
    pub execution_plan: String,
    pub tenant_id: i32,
    /// Discovery (manager) service host.
    pub discovery_host: String,
    /// Discovery (manager) service port.
    pub discovery_port: u16,
    /// PEM CA bundle used to verify the receiving service. Plaintext when unset.
    pub trust_store_path: Option<PathBuf>,
    /// Stream ids forwarded by this relay.
    pub exported_streams: Vec<String>,
    /// `define stream` / `define partition` statements of the plan.
    pub stream_definitions: Vec<String>,
    /// Queries of the plan, used to infer implicitly declared streams.
    pub queries: Vec<String>,
    /// How long the discovery service may take to answer.
    pub resolve_timeout_secs: u64,
    /// Successful sends between throughput log lines.
    pub throughput_batch: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            execution_plan: String::new(),
            tenant_id: SUPER_TENANT_ID,
            discovery_host: "localhost".to_string(),
            discovery_port: 7611,
            trust_store_path: None,
            exported_streams: Vec::new(),
            stream_definitions: Vec::new(),
            queries: Vec::new(),
            resolve_timeout_secs: 30,
            throughput_batch: DEFAULT_THROUGHPUT_BATCH,
        }
    }
}

impl RelayConfig {
    pub const fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// `host:port` of the discovery service.
    pub fn discovery_addr(&self) -> String {
        format!("{}:{}", self.discovery_host, self.discovery_port)
    }

    /// Reject configurations no relay could run with.
    pub fn validate(&self) -> Result<()> {
        if self.execution_plan.trim().is_empty() {
            return Err(Error::Config("execution_plan must not be empty".into()));
        }
        if self.discovery_host.trim().is_empty() {
            return Err(Error::Config("discovery_host must not be empty".into()));
        }
        if self.discovery_port == 0 {
            return Err(Error::Config("discovery_port must not be 0".into()));
        }
        if self.exported_streams.is_empty() {
            return Err(Error::Config(
                "at least one exported stream is required".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.exported_streams.iter().find(|s| !seen.insert(*s)) {
            return Err(Error::Config(format!(
                "exported stream '{dup}' is listed more than once"
            )));
        }
        if self.throughput_batch == 0 {
            return Err(Error::Config("throughput_batch must be positive".into()));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let mut config = load_config_file(path)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<RelayConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut RelayConfig) {
    if let Ok(val) = std::env::var("SIPHON_DISCOVERY_HOST") {
        config.discovery_host = val;
    }
    if let Ok(val) = std::env::var("SIPHON_DISCOVERY_PORT") {
        if let Ok(n) = val.parse() {
            config.discovery_port = n;
        }
    }
    if let Ok(val) = std::env::var("SIPHON_TRUST_STORE") {
        config.trust_store_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SIPHON_TENANT_ID") {
        if let Ok(n) = val.parse() {
            config.tenant_id = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig {
            execution_plan: "StockPlan".into(),
            exported_streams: vec!["OutStream".into()],
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_manager_conventions() {
        let config = RelayConfig::default();
        assert_eq!(config.tenant_id, -1234);
        assert_eq!(config.resolve_timeout(), Duration::from_secs(30));
        assert_eq!(config.throughput_batch, 10_000);
        assert!(config.trust_store_path.is_none());
    }

    #[test]
    fn toml_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            r#"
execution_plan = "StockPlan"
discovery_host = "10.0.0.1"
discovery_port = 7611
exported_streams = ["OutStream"]
stream_definitions = ["define stream OutStream (price double)"]
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.execution_plan, "StockPlan");
        assert_eq!(config.discovery_addr(), "10.0.0.1:7611");
        assert_eq!(config.stream_definitions.len(), 1);
        assert!(config.queries.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_configs() {
        assert!(valid().validate().is_ok());

        let mut c = valid();
        c.execution_plan = " ".into();
        assert!(c.validate().is_err());

        let mut c = valid();
        c.exported_streams.clear();
        assert!(c.validate().is_err());

        let mut c = valid();
        c.exported_streams.push("OutStream".into());
        assert!(c.validate().is_err());

        let mut c = valid();
        c.discovery_port = 0;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.throughput_batch = 0;
        assert!(c.validate().is_err());
    }
}
