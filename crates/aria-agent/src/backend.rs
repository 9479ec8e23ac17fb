//! The contract between the supervisor and the two worker backends.
//!
//! A backend knows how to start one worker attempt and hand back its two
//! byte streams, a termination handle and an exit signal. The supervisor
//! never looks past this contract; native processes and sandboxed modules
//! are interchangeable behind it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aria_core::{BackendKind, ExitSignal, Generation};
use aria_mcp::{McpSession, ToolClient, TransportResult};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StartupError;

/// Read end of a worker's output stream.
pub type WorkerReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write end of a worker's input stream.
pub type WorkerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Releases everything one worker attempt holds.
#[async_trait]
pub trait WorkerHandle: Send {
    /// Stop the worker and wait (bounded) for it to go away.
    ///
    /// Consumes the handle, so it can run at most once per attempt.
    async fn terminate(self: Box<Self>);
}

/// A started worker attempt.
pub struct LaunchedWorker {
    /// Worker output.
    pub reader: WorkerReader,
    /// Worker input.
    pub writer: WorkerWriter,
    /// Termination handle.
    pub handle: Box<dyn WorkerHandle>,
    /// Resolves once the worker has really stopped.
    pub exit: ExitSignal,
}

impl std::fmt::Debug for LaunchedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedWorker")
            .field("exit", &self.exit.peek())
            .finish_non_exhaustive()
    }
}

/// Starts worker attempts.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Which kind of worker this backend runs.
    fn kind(&self) -> BackendKind;

    /// Start one worker attempt tagged with `generation`.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if the worker cannot be started; nothing
    /// acquired by the failed attempt outlives the call.
    async fn launch(&self, generation: Generation) -> Result<LaunchedWorker, StartupError>;

    /// Release state shared across attempts. Called once, at supervisor
    /// shutdown.
    async fn shutdown(&self);
}

/// Turns a launched worker's streams into a tool client.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run the protocol handshake over the streams.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the handshake fails.
    async fn connect(
        &self,
        generation: Generation,
        reader: WorkerReader,
        writer: WorkerWriter,
    ) -> TransportResult<Arc<dyn ToolClient>>;
}

/// [`Connector`] speaking MCP through [`McpSession`].
#[derive(Debug, Clone)]
pub struct McpConnector {
    worker: String,
    init_timeout: Duration,
    close_timeout: Duration,
}

impl McpConnector {
    /// Create a connector for `worker`.
    #[must_use]
    pub fn new(worker: impl Into<String>, init_timeout: Duration) -> Self {
        Self {
            worker: worker.into(),
            init_timeout,
            close_timeout: Duration::from_secs(2),
        }
    }

    /// Set the graceful close deadline.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for McpConnector {
    async fn connect(
        &self,
        generation: Generation,
        reader: WorkerReader,
        writer: WorkerWriter,
    ) -> TransportResult<Arc<dyn ToolClient>> {
        tracing::debug!(worker = %self.worker, %generation, "starting MCP handshake");
        let session = McpSession::connect(&self.worker, reader, writer, self.init_timeout)
            .await?
            .with_close_timeout(self.close_timeout);
        Ok(Arc::new(session))
    }
}
