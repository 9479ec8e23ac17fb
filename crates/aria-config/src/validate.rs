//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted handshake deadline.
const MAX_INIT_TIMEOUT_SECS: u64 = 600;
/// Longest accepted startup grace period.
const MAX_STARTUP_GRACE_MILLIS: u64 = 60_000;
/// Longest accepted default fetch timeout.
const MAX_FETCH_TIMEOUT_MILLIS: u64 = 600_000;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_agent(config)?;
    validate_sandbox(config)?;
    validate_fetch(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_agent(config: &Config) -> ConfigResult<()> {
    let a = &config.agent;

    if a.name.trim().is_empty() {
        return Err(ConfigError::invalid("agent.name", "must not be empty"));
    }
    if a.init_timeout_secs == 0 || a.init_timeout_secs > MAX_INIT_TIMEOUT_SECS {
        return Err(ConfigError::invalid(
            "agent.init_timeout_secs",
            format!("must be between 1 and {MAX_INIT_TIMEOUT_SECS}"),
        ));
    }
    if a.call_timeout_secs == Some(0) {
        return Err(ConfigError::invalid(
            "agent.call_timeout_secs",
            "must be positive; remove the key for no deadline",
        ));
    }
    if a.shutdown_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "agent.shutdown_timeout_secs",
            "must be positive",
        ));
    }
    if a.kill_grace_millis == 0 {
        return Err(ConfigError::invalid("agent.kill_grace_millis", "must be positive"));
    }
    if a
        .worker_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(ConfigError::invalid(
            "agent.worker_path",
            "must not be empty; remove the key to disable the agent",
        ));
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;

    if s.startup_grace_millis == 0 || s.startup_grace_millis > MAX_STARTUP_GRACE_MILLIS {
        return Err(ConfigError::invalid(
            "sandbox.startup_grace_millis",
            format!("must be between 1 and {MAX_STARTUP_GRACE_MILLIS}"),
        ));
    }
    if s.max_memory_bytes == Some(0) {
        return Err(ConfigError::invalid(
            "sandbox.max_memory_bytes",
            "must be positive",
        ));
    }
    if let Some(host) = s.allow_hosts.iter().find(|h| h.trim().is_empty() || h.contains('/')) {
        return Err(ConfigError::invalid(
            "sandbox.allow_hosts",
            format!("'{host}' is not a host name"),
        ));
    }
    Ok(())
}

fn validate_fetch(config: &Config) -> ConfigResult<()> {
    let f = &config.fetch;

    if f.default_timeout_millis == 0 || f.default_timeout_millis > MAX_FETCH_TIMEOUT_MILLIS {
        return Err(ConfigError::invalid(
            "fetch.default_timeout_millis",
            format!("must be between 1 and {MAX_FETCH_TIMEOUT_MILLIS}"),
        ));
    }
    if f.max_response_bytes == 0 {
        return Err(ConfigError::invalid(
            "fetch.max_response_bytes",
            "must be positive",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !LOG_LEVELS.contains(&l.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: {}",
                l.level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }
    if !LOG_FORMATS.contains(&l.format.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: {}",
                l.format,
                LOG_FORMATS.join(", ")
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(err @ ConfigError::Invalid { .. }) => err.field().unwrap_or_default().to_owned(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut c = Config::default();
        c.agent.init_timeout_secs = 0;
        assert_eq!(field_of(validate(&c)), "agent.init_timeout_secs");

        let mut c = Config::default();
        c.agent.call_timeout_secs = Some(0);
        assert_eq!(field_of(validate(&c)), "agent.call_timeout_secs");

        let mut c = Config::default();
        c.fetch.default_timeout_millis = 0;
        assert_eq!(field_of(validate(&c)), "fetch.default_timeout_millis");

        let mut c = Config::default();
        c.sandbox.startup_grace_millis = 0;
        assert_eq!(field_of(validate(&c)), "sandbox.startup_grace_millis");
    }

    #[test]
    fn rejects_empty_names_and_paths() {
        let mut c = Config::default();
        c.agent.name = "  ".into();
        assert_eq!(field_of(validate(&c)), "agent.name");

        let mut c = Config::default();
        c.agent.worker_path = Some(PathBuf::new());
        assert_eq!(field_of(validate(&c)), "agent.worker_path");
    }

    #[test]
    fn rejects_bad_hosts_and_logging() {
        let mut c = Config::default();
        c.sandbox.allow_hosts = vec!["https://example.com/".into()];
        assert_eq!(field_of(validate(&c)), "sandbox.allow_hosts");

        let mut c = Config::default();
        c.logging.format = "xml".into();
        assert_eq!(field_of(validate(&c)), "logging.format");

        let mut c = Config::default();
        c.logging.level = "loud".into();
        assert_eq!(field_of(validate(&c)), "logging.level");
    }
}
