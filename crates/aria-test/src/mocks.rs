//! Mock implementations for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use aria_core::{FetchRequest, FetchResult, Fetcher};
use aria_mcp::{ToolClient, ToolResponse, TransportError, TransportResult};

/// A tool call captured by [`MockToolClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Tool name.
    pub name: String,
    /// Arguments as sent.
    pub arguments: Map<String, Value>,
}

/// Mock implementation of [`ToolClient`].
///
/// Queued outcomes are returned in order; once the queue is empty every call
/// gets the default response. A queued disconnect error marks the client
/// closed, after which calls fail with [`TransportError::Closed`] the way a
/// real session does.
#[derive(Debug, Clone)]
pub struct MockToolClient {
    /// Queued call outcomes.
    outcomes: Arc<Mutex<VecDeque<TransportResult<ToolResponse>>>>,
    /// Response when the queue is empty.
    default_response: ToolResponse,
    /// Captured calls.
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Whether the client is closed.
    closed: Arc<AtomicBool>,
    /// Number of `close` calls.
    close_count: Arc<AtomicUsize>,
    /// Artificial latency per call.
    delay: Option<Duration>,
}

impl MockToolClient {
    /// Create a mock whose default response is empty content.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            default_response: ToolResponse::empty(),
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            close_count: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Queue a successful response.
    #[must_use]
    pub fn with_response(self, response: ToolResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_failure(self, error: TransportError) -> Self {
        self.push(Err(error));
        self
    }

    /// Set the response returned once the queue is drained.
    #[must_use]
    pub fn with_default_response(mut self, response: ToolResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Delay every call by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an outcome after construction.
    pub fn push(&self, outcome: TransportResult<ToolResponse>) {
        if let Ok(mut guard) = self.outcomes.lock() {
            guard.push_back(outcome);
        }
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Number of times `close` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl Default for MockToolClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolClient for MockToolClient {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> TransportResult<ToolResponse> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(RecordedCall {
                name: name.to_string(),
                arguments,
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(Err(err)) => {
                if err.is_disconnect() {
                    self.closed.store(true, Ordering::SeqCst);
                }
                Err(err)
            },
            Some(Ok(response)) => Ok(response),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock implementation of [`Fetcher`].
///
/// Records every request and answers from a queue, falling back to a
/// default result.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    /// Queued results.
    results: Arc<Mutex<VecDeque<FetchResult>>>,
    /// Result when the queue is empty.
    default_result: FetchResult,
    /// Captured requests.
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    /// Create a mock answering `200` with an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            default_result: FetchResult::success(200, Vec::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a result.
    #[must_use]
    pub fn with_result(self, result: FetchResult) -> Self {
        if let Ok(mut guard) = self.results.lock() {
            guard.push_back(result);
        }
        self
    }

    /// Set the result returned once the queue is drained.
    #[must_use]
    pub fn with_default_result(mut self, result: FetchResult) -> Self {
        self.default_result = result;
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }
        self.results
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default_result.clone())
    }
}
