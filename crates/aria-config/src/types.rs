//! Configuration types for the Aria runtime.
//!
//! Every struct implements [`Default`] with production defaults, so a bare
//! `[section]` header in TOML yields a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker supervision.
    pub agent: AgentSection,
    /// Sandbox engine settings (module workers only).
    pub sandbox: SandboxSection,
    /// Host fetch capability.
    pub fetch: FetchSection,
    /// Logging.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Worker location and supervision timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent name used in logs and permission checks.
    pub name: String,
    /// Path to the worker executable or `.wasm` module. Unset disables the agent.
    pub worker_path: Option<PathBuf>,
    /// Extra arguments for a native worker process.
    pub worker_args: Vec<String>,
    /// Deadline for the initialize handshake.
    pub init_timeout_secs: u64,
    /// Per-call deadline. Unset means calls wait as long as the worker does.
    pub call_timeout_secs: Option<u64>,
    /// Deadline for a graceful transport close and module shutdown.
    pub shutdown_timeout_secs: u64,
    /// How long to wait for a killed process to be reaped.
    pub kill_grace_millis: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "mcp".to_owned(),
            worker_path: None,
            worker_args: Vec::new(),
            init_timeout_secs: 10,
            call_timeout_secs: None,
            shutdown_timeout_secs: 2,
            kill_grace_millis: 2000,
        }
    }
}

impl AgentSection {
    /// Handshake deadline.
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Per-call deadline, if configured.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    /// Graceful shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reap deadline after a kill.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// Sandbox engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Data directory. The compile cache lives at `<data_dir>/cache/wasm`.
    /// Unset means `~/.aria/data`.
    pub data_dir: Option<PathBuf>,
    /// Persist compiled code between runs.
    pub compile_cache: bool,
    /// Compile the module once when the agent is built instead of per session.
    pub precompile: bool,
    /// How long a freshly started module must keep running to count as started.
    pub startup_grace_millis: u64,
    /// Upper bound on a module's linear memory.
    pub max_memory_bytes: Option<u64>,
    /// Hosts the module may fetch from. Empty allows every host.
    pub allow_hosts: Vec<String>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            compile_cache: true,
            precompile: true,
            startup_grace_millis: 1000,
            max_memory_bytes: None,
            allow_hosts: Vec::new(),
        }
    }
}

impl SandboxSection {
    /// Startup grace period.
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_millis)
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Host fetch capability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    /// Timeout used when the guest passes a non-positive one.
    pub default_timeout_millis: u64,
    /// Responses larger than this are reported as body read failures.
    pub max_response_bytes: u64,
    /// `User-Agent` header. Unset uses the built-in agent string.
    pub user_agent: Option<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            default_timeout_millis: 30_000,
            max_response_bytes: 5_242_880,
            user_agent: None,
        }
    }
}

impl FetchSection {
    /// Default per-request timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_millis)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Per-target directives such as `aria_sandbox=debug`.
    pub directives: Vec<String>,
    /// Write rolling log files here instead of stderr.
    pub directory: Option<PathBuf>,
    /// Forward a native worker's stderr lines into the log.
    pub worker_output: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
            directory: None,
            worker_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_sections_use_defaults() {
        let config: Config = toml::from_str("[agent]\n[sandbox]\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn durations() {
        let config = Config::default();
        assert_eq!(config.agent.init_timeout(), Duration::from_secs(10));
        assert_eq!(config.agent.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(config.agent.call_timeout(), None);
        assert_eq!(config.sandbox.startup_grace(), Duration::from_secs(1));
        assert_eq!(config.fetch.default_timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            worker_path = "/opt/aria/mcp-server.wasm"
            call_timeout_secs = 15
        "#,
        )
        .unwrap();
        assert_eq!(
            config.agent.worker_path,
            Some(PathBuf::from("/opt/aria/mcp-server.wasm"))
        );
        assert_eq!(config.agent.call_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.agent.name, "mcp");
    }
}
