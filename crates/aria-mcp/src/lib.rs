//! Aria MCP - Transport and tool invocation for Aria workers.
//!
//! Workers speak MCP (JSON-RPC 2.0, newline framed) over a pair of byte
//! streams. This crate provides:
//! - [`McpSession`]: an rmcp client session over any reader/writer pair
//! - [`ToolClient`]: the seam the supervisor calls through
//! - [`ArtistArgs`] and [`ToolName`]: the worker's tool surface
//! - [`map_response`]: normalization of tool responses to text or not-found
//!
//! # Example
//!
//! ```rust,no_run
//! use aria_mcp::{ArtistArgs, McpSession, ToolClient, ToolName, map_response};
//! use std::time::Duration;
//!
//! # async fn example(
//! #     reader: tokio::process::ChildStdout,
//! #     writer: tokio::process::ChildStdin,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let session = McpSession::connect("mcp", reader, writer, Duration::from_secs(10)).await?;
//! let args = ArtistArgs::new("1", "Nirvana").with_mbid("5b11f4ce-a62d-471e-81fc-a69a8278c7da");
//! let response = session
//!     .call_tool(ToolName::ArtistBiography.as_str(), args.to_arguments())
//!     .await?;
//! let text = map_response(ToolName::ArtistBiography.as_str(), &response);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod client;
mod error;
mod handler;
mod mapping;
mod session;
mod tools;
mod types;

pub use client::ToolClient;
pub use error::{TransportError, TransportResult};
pub use handler::AriaClientHandler;
pub use mapping::{HANDLER_ERROR_PREFIX, NotFound, NotFoundCause, classify_response, map_response};
pub use session::McpSession;
pub use tools::{ArtistArgs, ToolName};
pub use types::{ToolContent, ToolResponse};
