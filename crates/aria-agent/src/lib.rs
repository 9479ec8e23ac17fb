//! Aria Agent - Supervised MCP workers.
//!
//! A [`WorkerSupervisor`] owns at most one worker session at a time. It
//! starts the worker on first use, restarts it on the next call after it
//! dies, and maps every failure to an [`AgentError`]. Workers run either as
//! native processes ([`ProcessBackend`]) or as sandboxed WASM modules
//! ([`ModuleBackend`]); the supervisor does not care which.
//!
//! [`ArtistAgent`] is the configured front door exposing the
//! `get_artist_biography` and `get_artist_url` tools.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aria_agent::{ArtistAgent, gate_from_config};
//! use aria_config::Config;
//! use aria_sandbox::HttpFetcher;
//!
//! # async fn example(config: Config) -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(HttpFetcher::new(None, 5_242_880)?);
//! if let Some(agent) = ArtistAgent::from_config(&config, gate_from_config(&config), fetcher).await {
//!     let bio = agent.get_artist_biography("1", "Nirvana", "").await?;
//!     println!("{bio}");
//!     agent.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod agent;
mod backend;
mod error;
mod module;
mod process;
mod supervisor;

pub use agent::{ArtistAgent, gate_from_config, resolve_worker_path};
pub use backend::{
    Connector, LaunchedWorker, McpConnector, WorkerBackend, WorkerHandle, WorkerReader,
    WorkerWriter,
};
pub use error::{AgentError, AgentResult, StartupError};
pub use module::ModuleBackend;
pub use process::{ProcessBackend, WORKER_LOG_TARGET};
pub use supervisor::{SupervisorState, WorkerSupervisor};
