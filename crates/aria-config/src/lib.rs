//! Configuration for Aria.
//!
//! A [`Config`] is assembled from TOML layers merged key by key, later
//! layers winning:
//!
//! - `defaults.toml` embedded in the binary
//! - `ARIA_*` variables, only for keys no file sets
//! - `/etc/aria/config.toml`
//! - `$ARIA_HOME/config.toml`, else `~/.aria/config.toml`
//! - `.aria/config.toml` in the workspace
//! - the file given with `--config`
//!
//! The merged table is validated before it is returned, and
//! [`ResolvedConfig`] remembers which layer supplied each key.
//!
//! ```rust,no_run
//! use aria_config::{Config, LoadOptions};
//!
//! # fn main() -> aria_config::ConfigResult<()> {
//! let resolved = Config::load(&LoadOptions::default().without_system())?;
//! if resolved.config.agent.worker_path.is_none() {
//!     eprintln!("no worker configured");
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

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered merging with source tracking.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadOptions;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        loader::load(options, &env::collect_env_vars())
    }

    /// Load configuration from a single file layered over the defaults only.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
