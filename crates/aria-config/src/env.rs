//! Environment variable fallbacks.
//!
//! Environment variables are **fallback**, not override: they only apply to
//! fields that no config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, set_path};

#[derive(Clone, Copy)]
enum ValueKind {
    String,
    Integer,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: ValueKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "ARIA_WORKER_PATH",
        field_path: "agent.worker_path",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "ARIA_DATA_DIR",
        field_path: "sandbox.data_dir",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "ARIA_FETCH_TIMEOUT_MS",
        field_path: "fetch.default_timeout_millis",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "ARIA_LOG_LEVEL",
        field_path: "logging.level",
        kind: ValueKind::String,
    },
];

/// Snapshot the `ARIA_*` environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("ARIA_"))
        .collect()
}

/// Apply environment fallbacks to fields still at their default.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] if a numeric variable does not parse.
pub fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let set_by_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file || raw.is_empty() {
            continue;
        }

        let value = match mapping.kind {
            ValueKind::String => toml::Value::String(raw.clone()),
            ValueKind::Integer => {
                let n: i64 = raw.trim().parse().map_err(|e| ConfigError::Env {
                    var: mapping.var_name.to_owned(),
                    message: format!("expected an integer: {e}"),
                })?;
                toml::Value::Integer(n)
            },
        };

        if set_path(merged, mapping.field_path, value) {
            sources.insert(
                mapping.field_path.to_owned(),
                ConfigLayer::Env(mapping.var_name.to_owned()),
            );
            debug!(var = mapping.var_name, field = mapping.field_path, "applied env fallback");
            count = count.saturating_add(1);
        }
    }

    Ok(count)
}
