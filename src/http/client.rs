//! HTTP executor for service tests
//!
//! Sends the call described by a test definition and classifies transport
//! errors into the engine's failure kinds.

use futures::future::BoxFuture;
use reqwest::{Certificate, Client, Method};
use std::fs;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::executor::TestExecutor;
use crate::models::{CallRequest, CallResponse, ExecutionError, TlsSettings};

/// `TestExecutor` backed by reqwest
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Client with default TLS verification. Deadlines are enforced by the
    /// engine, not by the client.
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("svcprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Client for the call; definitions with custom TLS get their own
    fn client_for(&self, tls: &TlsSettings) -> Result<Client, ExecutionError> {
        if *tls == TlsSettings::default() {
            return Ok(self.client.clone());
        }

        let mut builder = Client::builder().danger_accept_invalid_certs(tls.insecure);
        if let Some(path) = &tls.ca_cert {
            let pem = fs::read(path).map_err(|e| {
                ExecutionError::ProtocolError(format!("Cannot read CA {}: {e}", path.display()))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                ExecutionError::ProtocolError(format!("Invalid CA certificate: {e}"))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| ExecutionError::ProtocolError(format!("TLS setup failed: {e}")))
    }

    async fn send(&self, request: &CallRequest) -> Result<CallResponse, ExecutionError> {
        let client = self.client_for(&request.tls)?;
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ExecutionError::ProtocolError(format!("Invalid HTTP method {}", request.method))
        })?;

        debug!("Sending {} request to {}", method, request.endpoint);
        let mut req_builder = client.request(method, &request.endpoint);

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        if let Some(payload) = &request.payload {
            req_builder = req_builder.json(payload);
        }

        let start = Instant::now();
        let response = req_builder
            .send()
            .await
            .map_err(|e| classify(e, &request.endpoint))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutionError::ProtocolError(format!("Failed to read body: {e}")))?;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            start.elapsed().as_millis()
        );

        Ok(CallResponse {
            status: status.as_u16(),
            body: parse_body(&text),
        })
    }
}

impl TestExecutor for HttpExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a CallRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<CallResponse, ExecutionError>> {
        Box::pin(async move {
            tokio::select! {
                response = self.send(request) => response,
                _ = cancel.cancelled() => Err(ExecutionError::ProtocolError(
                    format!("Call to {} cancelled", request.endpoint),
                )),
            }
        })
    }
}

fn classify(err: reqwest::Error, endpoint: &str) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::Timeout(0)
    } else if err.is_connect() {
        ExecutionError::NetworkUnavailable(format!("{endpoint}: {err}"))
    } else {
        ExecutionError::ProtocolError(err.to_string())
    }
}

/// JSON when the body parses as JSON, otherwise the raw text
fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
