//! Transport security for publisher connections.
//!
//! Trust material is handed to each connection explicitly; nothing here
//! touches process-wide state.

use std::path::PathBuf;

use tonic::transport::{Certificate, ClientTlsConfig};
use tracing::info;

use crate::error::PublishError;

/// How publisher connections are secured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSecurity {
    /// PEM bundle of CA certificates trusted for the receiving service.
    /// Connections are plaintext when unset.
    pub trust_store: Option<PathBuf>,
    /// Server name to verify instead of the endpoint host.
    pub domain_name: Option<String>,
}

impl TransportSecurity {
    pub const fn plaintext() -> Self {
        Self {
            trust_store: None,
            domain_name: None,
        }
    }

    pub fn with_trust_store(path: impl Into<PathBuf>) -> Self {
        Self {
            trust_store: Some(path.into()),
            domain_name: None,
        }
    }

    #[must_use]
    pub fn with_domain_name(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = Some(domain.into());
        self
    }

    /// URI scheme matching this configuration.
    pub const fn scheme(&self) -> &'static str {
        if self.trust_store.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Build the tonic client TLS config, or `None` for plaintext.
    pub fn client_tls_config(&self) -> Result<Option<ClientTlsConfig>, PublishError> {
        let Some(path) = &self.trust_store else {
            return Ok(None);
        };
        let pem = std::fs::read_to_string(path).map_err(|e| {
            PublishError::Tls(format!(
                "Failed to read trust store {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
        if let Some(domain) = &self.domain_name {
            tls = tls.domain_name(domain.clone());
        }
        info!(trust_store = %path.display(), "TLS configured with trust store");
        Ok(Some(tls))
    }
}
