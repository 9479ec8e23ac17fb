//! Aria Test - Shared test utilities for the Aria runtime.
//!
//! This crate provides mock implementations, a fake worker backend and
//! fixtures that can be used across the Aria crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! aria-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use aria_mcp::{ToolClient, ToolResponse};
//!     use aria_test::{MockToolClient, test_artist};
//!
//!     #[tokio::test]
//!     async fn test_call() {
//!         let client = MockToolClient::new().with_response(ToolResponse::text("A bio."));
//!         let response = client
//!             .call_tool("get_artist_biography", test_artist().to_arguments())
//!             .await
//!             .unwrap();
//!         assert_eq!(response.first_text(), Some("A bio."));
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;
pub mod worker;

pub use fixtures::*;
pub use mocks::*;
pub use worker::*;
