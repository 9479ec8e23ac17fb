//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/aria/config.toml` (system)
//! 3. Merge the user config
//! 4. Merge `{workspace}/.aria/config.toml` (workspace)
//! 5. Merge the explicit `--config` file
//! 6. Apply env var fallbacks for unset fields
//! 7. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::apply_env_fallbacks;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

const SYSTEM_CONFIG_PATH: &str = "/etc/aria/config.toml";

/// Which layers to consult.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Project root; its `.aria/config.toml` is merged when present.
    pub workspace_root: Option<PathBuf>,
    /// Aria home directory override. Its `config.toml` is the user layer.
    pub home_override: Option<PathBuf>,
    /// A file named on the command line. Unlike the other layers it must exist.
    pub explicit_file: Option<PathBuf>,
    /// Skip `/etc/aria/config.toml` (used by tests).
    pub skip_system: bool,
}

impl LoadOptions {
    /// Set the workspace root.
    #[must_use]
    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Override the home directory.
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_override = Some(home.into());
        self
    }

    /// Add an explicit config file.
    #[must_use]
    pub fn with_explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Skip the system layer.
    #[must_use]
    pub fn without_system(mut self) -> Self {
        self.skip_system = true;
        self
    }
}

/// Load the configuration with layered file precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, the explicit
/// file is missing, an env fallback is malformed, or the merged
/// configuration fails validation.
pub fn load<S: std::hash::BuildHasher>(
    options: &LoadOptions,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged = parse_defaults()?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let mut layers: Vec<(PathBuf, ConfigLayer)> = Vec::new();
    if !options.skip_system {
        layers.push((PathBuf::from(SYSTEM_CONFIG_PATH), ConfigLayer::System));
    }
    if let Some(user_path) = user_config_path(options, env_vars)? {
        layers.push((user_path, ConfigLayer::User));
    }
    if let Some(ws_root) = &options.workspace_root {
        layers.push((
            ws_root.join(".aria").join("config.toml"),
            ConfigLayer::Workspace,
        ));
    }

    for (path, layer) in layers {
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
            info!(path = %path.display(), layer = %layer, "loaded config layer");
            loaded_files.push(path.display().to_string());
        }
    }

    if let Some(path) = &options.explicit_file {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::Missing { path: path.clone() })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::Explicit,
            &mut field_sources,
        );
        info!(path = %path.display(), "loaded explicit config");
        loaded_files.push(path.display().to_string());
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config = deserialize(merged, "<merged config>")?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a single file layered over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or the
/// result fails validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let mut merged = parse_defaults()?;
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::Missing {
        path: path.to_path_buf(),
    })?;
    let mut sources = FieldSources::new();
    deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::Explicit, &mut sources);

    let config = deserialize(merged, &path.display().to_string())?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::parse("<embedded defaults>", e))
}

fn deserialize(merged: toml::Value, label: &str) -> ConfigResult<Config> {
    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::parse(label, e))
}

/// The user layer: `<home_override>/config.toml`, else
/// `$ARIA_HOME/config.toml`, else `~/.aria/config.toml`.
fn user_config_path<S: std::hash::BuildHasher>(
    options: &LoadOptions,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Option<PathBuf>> {
    if let Some(home) = &options.home_override {
        return Ok(Some(home.join("config.toml")));
    }
    if let Some(aria_home) = env_vars.get("ARIA_HOME").filter(|h| !h.is_empty()) {
        let path = PathBuf::from(aria_home);
        if path.is_absolute() {
            return Ok(Some(path.join("config.toml")));
        }
        tracing::warn!(path = %aria_home, "ARIA_HOME is not absolute; ignoring");
    }
    let home = directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)?;
    Ok(Some(home.join(".aria").join("config.toml")))
}

/// Try to load a file, returning `None` if it doesn't exist.
///
/// Reads once with no separate existence check.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            path: path.to_path_buf(),
            size: content.len(),
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }

    let value: toml::Value = toml::from_str(&content)
        .map_err(|e| ConfigError::parse(path.display().to_string(), e))?;

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_deserialize_to_default_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_with_only_defaults() {
        let home = tempfile::tempdir().unwrap();
        let options = LoadOptions::default().with_home(home.path()).without_system();
        let resolved = load(&options, &no_env()).unwrap();
        assert_eq!(resolved.config, Config::default());
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("agent.name"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_layer_precedence() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        write(
            home.path(),
            "config.toml",
            "[agent]\ninit_timeout_secs = 20\nworker_path = \"/user/worker\"\n",
        );
        write(
            ws.path(),
            ".aria/config.toml",
            "[agent]\nworker_path = \"/ws/worker.wasm\"\n",
        );
        let explicit = write(ws.path(), "override.toml", "[agent]\ninit_timeout_secs = 5\n");

        let options = LoadOptions::default()
            .with_home(home.path())
            .with_workspace(ws.path())
            .with_explicit_file(&explicit)
            .without_system();
        let resolved = load(&options, &no_env()).unwrap();

        assert_eq!(
            resolved.config.agent.worker_path,
            Some(PathBuf::from("/ws/worker.wasm"))
        );
        assert_eq!(resolved.config.agent.init_timeout(), Duration::from_secs(5));
        assert_eq!(resolved.loaded_files.len(), 3);
        assert_eq!(
            resolved.field_sources.get("agent.worker_path"),
            Some(&ConfigLayer::Workspace)
        );
        assert_eq!(
            resolved.field_sources.get("agent.init_timeout_secs"),
            Some(&ConfigLayer::Explicit)
        );
    }

    #[test]
    fn test_env_fallback_only_when_unset() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "config.toml", "[logging]\nlevel = \"warn\"\n");
        let env: HashMap<String, String> = [
            ("ARIA_LOG_LEVEL".to_owned(), "trace".to_owned()),
            ("ARIA_WORKER_PATH".to_owned(), "/env/worker".to_owned()),
        ]
        .into_iter()
        .collect();

        let options = LoadOptions::default().with_home(home.path()).without_system();
        let resolved = load(&options, &env).unwrap();
        assert_eq!(resolved.config.logging.level, "warn");
        assert_eq!(
            resolved.config.agent.worker_path,
            Some(PathBuf::from("/env/worker"))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let options = LoadOptions::default()
            .with_home(home.path())
            .with_explicit_file(home.path().join("nope.toml"))
            .without_system();
        assert!(matches!(
            load(&options, &no_env()),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn test_invalid_layer_fails_validation() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "config.toml", "[agent]\ninit_timeout_secs = 0\n");
        let options = LoadOptions::default().with_home(home.path()).without_system();
        assert!(matches!(
            load(&options, &no_env()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.toml", "[agent\n");
        match load_file(&path) {
            Err(ConfigError::Parse { origin, .. }) => assert!(origin.ends_with("bad.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        let file_path = write(dir.path(), "huge.toml", &data);

        let result = try_load_file(&file_path);
        assert!(
            matches!(result, Err(ConfigError::TooLarge { .. })),
            "expected TooLarge for oversized config, got: {result:?}"
        );
    }
}
