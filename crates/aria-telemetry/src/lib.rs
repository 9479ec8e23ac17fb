//! Aria Telemetry - Logging for the Aria agent host runtime.
//!
//! Builds the global `tracing` subscriber from a [`LogConfig`], usually
//! derived from the `[logging]` config section.
//!
//! # Example
//!
//! ```rust,no_run
//! use aria_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), aria_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("aria_agent=debug");
//!
//! let _guard = setup_logging(&config)?;
//! tracing::info!("worker supervisor starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogGuard, LogTarget, WORKER_OUTPUT_TARGET,
    setup_logging,
};
