//! HTTP transport implementation backed by `reqwest`.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;

use super::{AgentTransport, TransportFuture};
use crate::error::{DiscoveryError, Result};

/// HTTP/1.1 transport to the host agent.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DiscoveryError::Protocol(format!(
            "{url} answered with status {status}"
        )))
    }
}

impl AgentTransport for HttpTransport {
    fn header_probe<'a>(
        &'a self,
        url: &'a str,
        method: Method,
        header: &'a str,
    ) -> TransportFuture<'a, Option<String>> {
        Box::pin(async move {
            let response = self.client.request(method, url).send().await?;

            Ok(response
                .headers()
                .get(header)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string))
        })
    }

    fn exchange<'a>(
        &'a self,
        url: &'a str,
        method: Method,
        payload: Value,
    ) -> TransportFuture<'a, (u16, Value)> {
        Box::pin(async move {
            let response = self
                .client
                .request(method, url)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            check_status(url, status)?;

            let body = response.bytes().await?;
            let value = if body.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                serde_json::from_slice(&body)?
            };

            Ok((status.as_u16(), value))
        })
    }

    fn head_probe<'a>(&'a self, url: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let response = self.client.head(url).send().await?;
            check_status(url, response.status())
        })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status("http://h/", reqwest::StatusCode::OK).is_ok());
        assert!(check_status("http://h/", reqwest::StatusCode::NO_CONTENT).is_ok());

        let err = check_status("http://h/", reqwest::StatusCode::NOT_FOUND).unwrap_err();
        assert!(matches!(err, DiscoveryError::Protocol(_)));
    }

    #[test]
    fn test_transport_name() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        assert_eq!(transport.name(), "HTTP");
    }
}
