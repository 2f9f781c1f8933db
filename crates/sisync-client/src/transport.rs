//! HTTP transport capability.
//!
//! The client talks to the SIS through this narrow seam instead of owning a
//! concrete HTTP stack, so tests can inject scripted transports and the
//! production path stays a thin reqwest wrapper.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SisError, SisResult};

/// A raw HTTP response: status code and body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text; may be empty.
    pub body: String,
}

/// Minimal GET-only transport the SIS client dispatches through.
///
/// The SIS API (token endpoint included) only supports GET, so the seam is
/// deliberately that narrow.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a GET request with the given query parameters and headers.
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> SisResult<HttpResponse>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given request timeout.
    pub fn new(timeout: Duration) -> SisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sisync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SisError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> SisResult<HttpResponse> {
        debug!(url, "SIS GET");
        let mut builder = self.client.get(url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
