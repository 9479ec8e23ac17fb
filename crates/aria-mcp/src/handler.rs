//! `impl rmcp::ClientHandler` for Aria workers.

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation, ProtocolVersion};

/// Client-side handler for a worker session.
///
/// Workers never issue server-initiated requests (sampling, roots,
/// elicitation), so only the client identity is customized.
#[derive(Debug, Clone)]
pub struct AriaClientHandler {
    worker: String,
}

impl AriaClientHandler {
    /// Create a handler for the named worker.
    #[must_use]
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
        }
    }

    /// Worker name this handler serves.
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl rmcp::ClientHandler for AriaClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: ProtocolVersion::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "aria".to_string(),
                title: Some("Aria Agent Host".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
        }
    }
}
