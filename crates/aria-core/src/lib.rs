//! Aria Core - Foundation types and traits for the Aria agent host runtime.
//!
//! This crate provides:
//! - Session generations that disambiguate worker restarts
//! - The backend kind selector (native process vs. sandbox module)
//! - Fetch request/result types and the [`Fetcher`] capability
//! - The [`HostCallGate`] permission check for host-function calls
//! - Worker exit signalling shared by both backends
//! - Home directory resolution

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod dirs;
pub mod exit;
pub mod fetch;
pub mod gate;
pub mod types;

pub use dirs::{AriaHome, wasm_cache_dir};
pub use exit::{ExitNotifier, ExitSignal, WorkerExit, exit_channel};
pub use fetch::{DEFAULT_FETCH_TIMEOUT, FetchRequest, FetchResult, Fetcher};
pub use gate::{AllowAllGate, DenyAllGate, HostAllowListGate, HostCallGate};
pub use types::{BackendKind, Generation};
