//! Outbound fetch capability used by sandboxed workers.
//!
//! The host never exposes a general network stack to a worker. The only way
//! out is a single request/response exchange described by [`FetchRequest`]
//! and answered with a [`FetchResult`].

use async_trait::async_trait;
use std::time::Duration;

/// Timeout applied when the guest passes a non-positive value.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// A single outbound HTTP request issued on behalf of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// HTTP method, already defaulted to `GET` when empty.
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Request body (may be empty).
    pub body: Vec<u8>,
    /// Deadline for this request alone.
    pub timeout: Duration,
}

impl FetchRequest {
    /// Create a request, normalizing an empty method to `GET`.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let method = method.into();
        Self {
            method: if method.is_empty() {
                "GET".to_string()
            } else {
                method
            },
            url: url.into(),
            body: Vec::new(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Attach a request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve a guest-supplied timeout in milliseconds.
    ///
    /// Zero and negative values fall back to `default`.
    #[must_use]
    pub fn resolve_timeout(millis: i32, default: Duration) -> Duration {
        match u64::try_from(millis) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => default,
        }
    }
}

/// Outcome of a [`FetchRequest`].
///
/// Three shapes are possible:
/// - transport failure: `status == 0`, `error` set, empty body
/// - body read failure: real `status`, `error` set, empty body
/// - success: real `status`, `error` unset, body present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// HTTP status code, or 0 when no response was received.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
    /// Error description when the exchange failed.
    pub error: Option<String>,
}

impl FetchResult {
    /// The request could not be built or sent.
    #[must_use]
    pub fn transport_failure(error: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// A response arrived but its body could not be read.
    #[must_use]
    pub fn body_read_failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            body: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// A complete response.
    #[must_use]
    pub fn success(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
        }
    }

    /// Whether the exchange completed without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Performs outbound requests for the host-function bridge.
///
/// Implementations must never panic and must fold every failure into the
/// returned [`FetchResult`]; the bridge writes whatever comes back into
/// guest memory verbatim.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute the request.
    async fn fetch(&self, request: FetchRequest) -> FetchResult;
}
