//! Agent error types.

use std::io;
use std::time::Duration;

use aria_mcp::{NotFound, TransportError};
use aria_sandbox::SandboxError;
use thiserror::Error;

/// Why a worker session could not be started.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The worker process could not be spawned.
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] io::Error),

    /// The worker module could not be instantiated.
    #[error("failed to instantiate worker module: {0}")]
    Instantiate(#[source] SandboxError),

    /// The worker stopped before it started serving.
    #[error("worker exited during startup: {0}")]
    ExitedEarly(String),

    /// The MCP initialize handshake failed.
    #[error("MCP initialize failed: {0}")]
    Handshake(#[source] TransportError),

    /// The start attempt itself died.
    #[error("start attempt aborted: {0}")]
    Aborted(String),
}

/// Errors returned to callers of the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No session could be started; the next call retries.
    #[error("agent not ready")]
    NotReady(#[source] StartupError),

    /// The worker went away mid-call.
    #[error("process communication error")]
    Communication(#[source] TransportError),

    /// The call failed for a reason other than a dead worker.
    #[error("failed to call MCP tool '{tool}'")]
    ToolCall {
        /// Tool name.
        tool: String,
        /// Underlying error.
        #[source]
        source: TransportError,
    },

    /// The tool had nothing to return.
    #[error("data not found")]
    NotFound,

    /// The call exceeded its deadline. The session is unaffected.
    #[error("MCP tool '{tool}' timed out after {after:?}")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The supervisor was shut down.
    #[error("agent has been shut down")]
    ShutDown,
}

impl AgentError {
    /// Whether this is the not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the worker died during the call.
    #[must_use]
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication(_))
    }
}

impl From<NotFound> for AgentError {
    fn from(_: NotFound) -> Self {
        Self::NotFound
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
