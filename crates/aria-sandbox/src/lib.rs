//! Aria Sandbox - WASM runtime for sandboxed Aria workers.
//!
//! A worker compiled to WebAssembly runs inside a [`SharedExecutionContext`]:
//! one wasmtime engine, linker and compiled module shared across every
//! session of the agent. Each session gets its own [`ModuleInstance`] whose
//! stdin and stdout are in-memory pipes, so the MCP transport works the
//! same way it does for a native process.
//!
//! The only capability a module gets beyond WASI stdio is `env.http_fetch`,
//! implemented by [`HostFunctionBridge`] on top of a [`Fetcher`](aria_core::Fetcher)
//! and a [`HostCallGate`](aria_core::HostCallGate).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bridge;
mod context;
mod error;
mod fetcher;
mod instance;
pub mod memory;

pub use bridge::{FetchCall, HOST_FAULT, HOST_OK, HostFunctionBridge, HttpFetchParams, IMPORT_MODULE, IMPORT_NAME};
pub use context::{ModuleSource, ModuleState, SandboxSettings, SharedExecutionContext};
pub use error::{SandboxError, SandboxResult};
pub use fetcher::{DEFAULT_MAX_RESPONSE_BYTES, HttpFetcher};
pub use instance::{InstanceControl, ModuleInstance};
