//! reqwest-backed [`Fetcher`].

use async_trait::async_trait;
use aria_core::{FetchRequest, FetchResult, Fetcher};
use futures::StreamExt;
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};

/// Default response size cap (5 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 5_242_880;

/// Outbound HTTP for the `http_fetch` capability.
///
/// Every request carries its own timeout, which covers connecting, sending
/// and reading the whole body. Bodies above `max_response_bytes` are
/// reported as a body read failure.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_response_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::HttpClient`] if the TLS backend cannot be
    /// initialized.
    pub fn new(user_agent: Option<&str>, max_response_bytes: usize) -> SandboxResult<Self> {
        let user_agent = user_agent.map_or_else(
            || format!("aria/{}", env!("CARGO_PKG_VERSION")),
            ToString::to_string,
        );
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| SandboxError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }

    /// Response size cap.
    #[must_use]
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        let method = match Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => return FetchResult::transport_failure(format!("failed to create request: {e}")),
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchResult::transport_failure(format!("failed to execute request: {e}"));
            },
        };
        let status = response.status().as_u16();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return FetchResult::body_read_failure(
                        status,
                        format!("failed to read response body: {e}"),
                    );
                },
            };
            if body.len().saturating_add(chunk.len()) > self.max_response_bytes {
                return FetchResult::body_read_failure(
                    status,
                    format!(
                        "failed to read response body: exceeds {} bytes",
                        self.max_response_bytes
                    ),
                );
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %request.url, status, bytes = body.len(), "fetch complete");
        FetchResult::success(status, body)
    }
}
