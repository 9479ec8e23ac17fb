//! Transport error types.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to a worker over its stdio transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is closed; the worker is gone or the session was shut down.
    #[error("transport closed")]
    Closed,

    /// Reading or writing the worker's streams failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The initialize handshake failed or timed out.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A call did not complete within its deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker answered with a JSON-RPC error.
    #[error("worker returned an error: {0}")]
    Remote(String),

    /// Any other protocol-level failure.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this error means the worker can no longer be reached.
    ///
    /// True for a closed transport, for broken-pipe and end-of-stream I/O
    /// errors, and for any error whose message reports a broken pipe or EOF.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) if is_disconnect_kind(e.kind()) => true,
            Self::Timeout(_) | Self::Remote(_) => false,
            other => message_reports_disconnect(&other.to_string()),
        }
    }
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

fn message_reports_disconnect(message: &str) -> bool {
    message.to_ascii_lowercase().contains("broken pipe") || message.contains("EOF")
}

impl From<rmcp::ServiceError> for TransportError {
    fn from(err: rmcp::ServiceError) -> Self {
        match err {
            rmcp::ServiceError::McpError(data) => Self::Remote(data.message.to_string()),
            rmcp::ServiceError::TransportClosed => Self::Closed,
            rmcp::ServiceError::Timeout { timeout } => Self::Timeout(timeout),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<rmcp::service::ClientInitializeError> for TransportError {
    fn from(err: rmcp::service::ClientInitializeError) -> Self {
        Self::Handshake(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_classification() {
        assert!(TransportError::Closed.is_disconnect());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(
            TransportError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_disconnect()
        );
        assert!(TransportError::Protocol("write failed: Broken pipe (os error 32)".into())
            .is_disconnect());
        assert!(TransportError::Protocol("unexpected EOF".into()).is_disconnect());

        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::PermissionDenied))
            .is_disconnect());
        assert!(!TransportError::Timeout(Duration::from_secs(1)).is_disconnect());
        assert!(!TransportError::Remote("broken pipe in worker".into()).is_disconnect());
        assert!(!TransportError::Handshake("bad version".into()).is_disconnect());
    }
}
