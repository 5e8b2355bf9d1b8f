//! Remote calls against one node's control endpoint.
//!
//! Nodes expose a Caddy-style admin API: `POST /load` replaces the live
//! configuration wholesale, `GET /config/` returns it. Each call carries
//! its own deadline; nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

/// Deadline for replacing a node's configuration.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(25);
/// Deadline for reading a node's configuration.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Deadline for a reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single node call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The payload was rejected before any network attempt.
    #[error("invalid JSON configuration: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// Connection failure or timeout.
    #[error("request to node failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The node answered with a non-success status.
    #[error("node returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The node answered with a body that is not well-formed JSON.
    #[error("node returned invalid JSON: {0}")]
    MalformedResponse(#[source] serde_json::Error),
}

/// The control endpoint of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub scheme: String,
    pub address: String,
    pub port: i32,
}

impl NodeEndpoint {
    /// Base URL of the node's control API.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.address, self.port)
    }
}

/// One node's control API, as consumed by the orchestrator.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Replace the node's live configuration wholesale with `payload`.
    async fn push(&self, endpoint: &NodeEndpoint, payload: &str) -> Result<(), TransportError>;

    /// Retrieve the node's current live configuration.
    async fn fetch(&self, endpoint: &NodeEndpoint) -> Result<String, TransportError>;

    /// Lightweight reachability check.
    async fn probe(&self, endpoint: &NodeEndpoint) -> Result<(), TransportError>;
}

/// HTTP implementation speaking the node admin API.
pub struct HttpNodeTransport {
    client: reqwest::Client,
}

impl HttpNodeTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpNodeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeTransport for HttpNodeTransport {
    async fn push(&self, endpoint: &NodeEndpoint, payload: &str) -> Result<(), TransportError> {
        // Reject malformed payloads before touching the network.
        serde_json::from_str::<serde_json::Value>(payload)
            .map_err(TransportError::InvalidPayload)?;

        let url = format!("{}/load", endpoint.base_url());
        debug!(url = %url, "Pushing configuration to node");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_owned())
            .timeout(PUSH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn fetch(&self, endpoint: &NodeEndpoint) -> Result<String, TransportError> {
        let url = format!("{}/config/", endpoint.base_url());
        debug!(url = %url, "Retrieving configuration from node");

        let response = self.client.get(&url).timeout(FETCH_TIMEOUT).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(TransportError::MalformedResponse)?;

        Ok(body)
    }

    async fn probe(&self, endpoint: &NodeEndpoint) -> Result<(), TransportError> {
        let url = format!("{}/config/", endpoint.base_url());

        let response = self.client.get(&url).timeout(PROBE_TIMEOUT).send().await?;

        // Any non-server-error answer means the control endpoint is reachable.
        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: "node control endpoint returned a server error".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint_for(server: &MockServer) -> NodeEndpoint {
        let addr = server.address();
        NodeEndpoint {
            scheme: "http".to_string(),
            address: addr.ip().to_string(),
            port: i32::from(addr.port()),
        }
    }

    #[test]
    fn base_url_includes_scheme_and_port() {
        let endpoint = NodeEndpoint {
            scheme: "https".to_string(),
            address: "10.0.1.10".to_string(),
            port: 2019,
        };
        assert_eq!(endpoint.base_url(), "https://10.0.1.10:2019");
    }

    #[tokio::test]
    async fn push_sends_payload_to_load() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load"))
            .and(body_string(r#"{"a":1}"#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        transport
            .push(&endpoint_for(&server), r#"{"a":1}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn push_rejects_malformed_payload_without_network() {
        // No server: the call must fail before any request is made.
        let endpoint = NodeEndpoint {
            scheme: "http".to_string(),
            address: "192.0.2.1".to_string(),
            port: 2019,
        };
        let transport = HttpNodeTransport::new();
        let err = transport.push(&endpoint, "not json").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn push_surfaces_remote_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown directive"))
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        let err = transport
            .push(&endpoint_for(&server), r#"{"a":1}"#)
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "unknown directive");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_returns_remote_configuration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"apps":{}}"#))
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        let body = transport.fetch(&endpoint_for(&server)).await.unwrap();
        assert_eq!(body, r#"{"apps":{}}"#);
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_remote_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        let err = transport.fetch(&endpoint_for(&server)).await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn probe_treats_client_errors_as_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        transport.probe(&endpoint_for(&server)).await.unwrap();
    }

    #[tokio::test]
    async fn probe_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpNodeTransport::new();
        let err = transport.probe(&endpoint_for(&server)).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn connection_failure_maps_to_request_error() {
        // Bind a port, then drop the listener so connections are refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = NodeEndpoint {
            scheme: "http".to_string(),
            address: "127.0.0.1".to_string(),
            port: i32::from(port),
        };
        let transport = HttpNodeTransport::new();
        let err = transport.probe(&endpoint).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
