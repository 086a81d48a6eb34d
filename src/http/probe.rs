//! TCP reachability probe

use futures::future::BoxFuture;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::executor::ReachabilityProbe;
use crate::models::ExecutionError;

/// Checks that the endpoint's host accepts TCP connections
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProbe;

impl ReachabilityProbe for TcpProbe {
    fn probe<'a>(
        &'a self,
        endpoint: &'a str,
        limit: Duration,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            let address = socket_address(endpoint)?;
            debug!("Probing {}", address);

            match timeout(limit, TcpStream::connect(&address)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(ExecutionError::NetworkUnavailable(format!("{address}: {e}"))),
                Err(_) => Err(ExecutionError::NetworkUnavailable(format!(
                    "{address}: no answer within {}ms",
                    limit.as_millis()
                ))),
            }
        })
    }
}

/// `host:port` for a URL or a bare `host:port` endpoint
pub fn socket_address(endpoint: &str) -> Result<String, ExecutionError> {
    if !endpoint.contains("://") {
        return Ok(endpoint.to_string());
    }

    let url = Url::parse(endpoint)
        .map_err(|e| ExecutionError::ProtocolError(format!("Invalid endpoint {endpoint}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ExecutionError::ProtocolError(format!("Endpoint {endpoint} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ExecutionError::ProtocolError(format!("Endpoint {endpoint} has no port")))?;

    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_address() {
        let cases = [
            ("http://api.local/users", "api.local:80"),
            ("https://api.local:8443/", "api.local:8443"),
            ("localhost:50051", "localhost:50051"),
        ];
        for (endpoint, expected) in cases {
            assert_eq!(socket_address(endpoint).unwrap(), expected);
        }
        assert!(matches!(
            socket_address("http://"),
            Err(ExecutionError::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = format!("http://127.0.0.1:{port}/health");
        let result = TcpProbe.probe(&endpoint, Duration::from_secs(1)).await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpProbe
            .probe(&format!("127.0.0.1:{port}"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ExecutionError::NetworkUnavailable(_))));
    }
}
