//! The tool-call seam between the supervisor and a worker session.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::TransportResult;
use crate::types::ToolResponse;

/// A connected worker session that can run tools.
///
/// Implemented by [`McpSession`](crate::McpSession) and by test doubles.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Call a tool and wait for its response.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
    -> TransportResult<ToolResponse>;

    /// Close the session. Idempotent.
    async fn close(&self);

    /// Whether the session has been closed or has observed a disconnect.
    fn is_closed(&self) -> bool;
}
