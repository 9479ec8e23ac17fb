//! rmcp-backed worker session over a pair of byte streams.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rmcp::ServiceExt;
use rmcp::model::{CallToolRequest, CallToolRequestParams, ClientRequest, ServerResult};
use rmcp::service::{Peer, RoleClient, RunningService};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ToolClient;
use crate::error::{TransportError, TransportResult};
use crate::handler::AriaClientHandler;
use crate::types::ToolResponse;

type WorkerService = RunningService<RoleClient, AriaClientHandler>;

/// Default deadline for a graceful session close.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// An initialized MCP client session with one worker.
///
/// Calls go through a cloned [`Peer`] so that concurrent calls never wait on
/// each other; only [`close`](ToolClient::close) touches the running service.
pub struct McpSession {
    worker: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<WorkerService>>,
    closed: AtomicBool,
    close_timeout: Duration,
}

impl McpSession {
    /// Run the initialize handshake over `reader`/`writer`.
    ///
    /// `reader` carries the worker's stdout, `writer` its stdin. Dropping the
    /// returned session (or closing it) closes `writer`, which the worker
    /// observes as end of input.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Handshake`] if the worker does not complete
    /// the handshake within `init_timeout` or answers it with an error.
    pub async fn connect<R, W>(
        worker: &str,
        reader: R,
        writer: W,
        init_timeout: Duration,
    ) -> TransportResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let handler = AriaClientHandler::new(worker);
        let service = match tokio::time::timeout(init_timeout, handler.serve((reader, writer))).await
        {
            Ok(Ok(service)) => service,
            Ok(Err(e)) => return Err(TransportError::from(e)),
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "no initialize response within {}ms",
                    init_timeout.as_millis()
                )));
            },
        };

        if let Some(info) = service.peer_info() {
            info!(
                worker,
                server = %info.server_info.name,
                server_version = %info.server_info.version,
                "MCP handshake complete"
            );
        }

        Ok(Self {
            worker: worker.to_string(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            closed: AtomicBool::new(false),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        })
    }

    /// Set the graceful close deadline.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Worker name.
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl fmt::Debug for McpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpSession")
            .field("worker", &self.worker)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolClient for McpSession {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> TransportResult<ToolResponse> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        debug!(worker = %self.worker, tool = name, "calling tool");
        let params = CallToolRequestParams {
            meta: None,
            name: Cow::Owned(name.to_string()),
            arguments: Some(arguments),
            task: None,
        };

        // A result with no content fails `CallToolResult` decoding and lands
        // in another variant; that is still an answer, just an empty one.
        let request = ClientRequest::CallToolRequest(CallToolRequest::new(params));
        match self.peer.send_request(request).await {
            Ok(ServerResult::CallToolResult(result)) => Ok(ToolResponse::from(result)),
            Ok(other) => {
                debug!(
                    worker = %self.worker,
                    tool = name,
                    result = ?other,
                    "tool result carried no content"
                );
                Ok(ToolResponse::empty())
            },
            Err(e) => {
                let err = TransportError::from(e);
                if err.is_disconnect() {
                    self.closed.store(true, Ordering::Release);
                }
                Err(err)
            },
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let Some(mut service) = self.service.lock().await.take() else {
            return;
        };

        match service.close_with_timeout(self.close_timeout).await {
            Ok(Some(reason)) => {
                debug!(worker = %self.worker, ?reason, "MCP session closed");
            },
            Ok(None) => {
                warn!(
                    worker = %self.worker,
                    timeout_ms = u64::try_from(self.close_timeout.as_millis()).unwrap_or(u64::MAX),
                    "MCP session close timed out; dropping"
                );
            },
            Err(e) => {
                warn!(worker = %self.worker, error = %e, "MCP session close join error");
            },
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
