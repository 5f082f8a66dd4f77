//! Endpoint resolution through the manager's discovery service.
//!
//! A resolution is one request and exactly one answer. The answer is
//! delivered on a oneshot channel from a background task, so the caller
//! never blocks on discovery and decides itself how long to wait.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use tokio::sync::oneshot;
use tonic::transport::Channel;
use tracing::{debug, error, info};

use siphon_proto::v1::discovery_service_client::DiscoveryServiceClient;
use siphon_proto::v1::{GetPublisherEndpointRequest, GetPublisherEndpointResponse};

use crate::error::ResolveError;

/// Network address of the receiving service assigned to a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parameters of a discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub plan_name: String,
    pub tenant_id: i32,
    /// How long the discovery service may take to answer.
    pub timeout: Duration,
    /// Address of this relay, reported to the manager.
    pub caller_address: String,
}

/// Receiving end of a pending resolution.
pub type Resolution = oneshot::Receiver<Result<Endpoint, ResolveError>>;

/// Looks up the endpoint the relay should publish to.
pub trait EndpointResolver: Send + Sync {
    /// Issue a discovery request and return immediately.
    ///
    /// The returned receiver yields exactly one answer. Implementations do
    /// not retry; a failure is reported as-is.
    fn resolve(&self, request: ResolveRequest) -> Resolution;
}

/// Resolver backed by the gRPC `DiscoveryService`.
#[derive(Debug, Clone)]
pub struct GrpcEndpointResolver {
    discovery_url: String,
}

impl GrpcEndpointResolver {
    pub fn new(discovery_host: &str, discovery_port: u16) -> Self {
        Self {
            discovery_url: format!("http://{discovery_host}:{discovery_port}"),
        }
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    async fn lookup(url: String, request: &ResolveRequest) -> Result<Endpoint, ResolveError> {
        let channel = Channel::from_shared(url)
            .map_err(|e| ResolveError::Connection(e.to_string()))?
            .connect_timeout(request.timeout)
            .timeout(request.timeout)
            .connect()
            .await
            .map_err(|e| ResolveError::Connection(e.to_string()))?;

        let mut client = DiscoveryServiceClient::new(channel);
        let response = client
            .get_publisher_endpoint(GetPublisherEndpointRequest {
                execution_plan: request.plan_name.clone(),
                tenant_id: request.tenant_id,
                timeout_secs: u32::try_from(request.timeout.as_secs()).unwrap_or(u32::MAX),
                caller_address: request.caller_address.clone(),
            })
            .await
            .map_err(|status| ResolveError::Rpc(status.message().to_string()))?;

        endpoint_from_response(&request.plan_name, response.into_inner())
    }
}

impl EndpointResolver for GrpcEndpointResolver {
    fn resolve(&self, request: ResolveRequest) -> Resolution {
        let (tx, rx) = oneshot::channel();
        let url = self.discovery_url.clone();
        tokio::spawn(async move {
            info!(
                discovery = %url,
                plan = %request.plan_name,
                tenant = request.tenant_id,
                "Requesting publisher endpoint"
            );
            let result = match tokio::time::timeout(request.timeout, Self::lookup(url, &request)).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout(request.timeout)),
            };
            if tx.send(result).is_err() {
                debug!(plan = %request.plan_name, "Resolution abandoned by caller");
            }
        });
        rx
    }
}

fn endpoint_from_response(
    plan_name: &str,
    response: GetPublisherEndpointResponse,
) -> Result<Endpoint, ResolveError> {
    if !response.found {
        return Err(ResolveError::NotFound(plan_name.to_string()));
    }
    if response.host.trim().is_empty() {
        return Err(ResolveError::InvalidEndpoint("empty host".into()));
    }
    let port = u16::try_from(response.port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ResolveError::InvalidEndpoint(format!("port {}", response.port)))?;
    Ok(Endpoint::new(response.host, port))
}

/// Address of the interface this host would use for outbound traffic.
///
/// Falls back to the loopback address when it cannot be determined.
pub fn local_address() -> String {
    match outbound_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            error!(error = %e, "Cannot find IP address of the host");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

fn outbound_ip() -> std::io::Result<IpAddr> {
    // Connecting a UDP socket only selects a route; nothing is sent.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(found: bool, host: &str, port: u32) -> GetPublisherEndpointResponse {
        GetPublisherEndpointResponse {
            found,
            host: host.into(),
            port,
        }
    }

    #[test]
    fn valid_response_yields_endpoint() {
        let ep = endpoint_from_response("plan", response(true, "10.0.0.5", 7612)).unwrap();
        assert_eq!(ep, Endpoint::new("10.0.0.5", 7612));
        assert_eq!(ep.to_string(), "10.0.0.5:7612");
    }

    #[test]
    fn not_found_response_is_failure() {
        let err = endpoint_from_response("plan", response(false, "", 0)).unwrap_err();
        assert_eq!(err, ResolveError::NotFound("plan".into()));
    }

    #[test]
    fn bad_host_or_port_is_invalid() {
        assert!(matches!(
            endpoint_from_response("p", response(true, " ", 7612)),
            Err(ResolveError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_from_response("p", response(true, "h", 0)),
            Err(ResolveError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_from_response("p", response(true, "h", 70_000)),
            Err(ResolveError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn local_address_is_an_ip() {
        assert!(local_address().parse::<IpAddr>().is_ok());
    }

    #[tokio::test]
    async fn unreachable_discovery_reports_failure() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let resolver = GrpcEndpointResolver::new("127.0.0.1", port);
        assert_eq!(resolver.discovery_url(), format!("http://127.0.0.1:{port}"));

        let rx = resolver.resolve(ResolveRequest {
            plan_name: "plan".into(),
            tenant_id: -1234,
            timeout: Duration::from_secs(5),
            caller_address: "127.0.0.1".into(),
        });
        let result = rx.await.unwrap();
        assert!(matches!(
            result,
            Err(ResolveError::Connection(_) | ResolveError::Timeout(_))
        ));
    }
}
