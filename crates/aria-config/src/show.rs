//! Resolved configuration display.

use std::fmt::Write as _;

use serde::Serialize;

use crate::merge::FieldSources;
use crate::types::Config;

/// A loaded configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Which layer set each field.
    pub field_sources: FieldSources,
    /// Files that contributed, in merge order.
    pub loaded_files: Vec<String>,
}

/// Output format for [`ResolvedConfig::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowFormat {
    /// TOML document.
    #[default]
    Toml,
    /// Pretty-printed JSON.
    Json,
    /// One `field = value  # source` line per field.
    Sources,
}

impl ResolvedConfig {
    /// Render the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error string if serialization fails.
    pub fn render(&self, format: ShowFormat) -> Result<String, String> {
        match format {
            ShowFormat::Toml => toml::to_string_pretty(&self.config).map_err(|e| e.to_string()),
            ShowFormat::Json => {
                serde_json::to_string_pretty(&self.config).map_err(|e| e.to_string())
            },
            ShowFormat::Sources => Ok(self.render_sources()),
        }
    }

    fn render_sources(&self) -> String {
        let flat = flatten(&self.config);
        let mut out = String::new();
        for (path, value) in flat {
            let source = self
                .field_sources
                .get(&path)
                .map_or_else(|| "defaults".to_owned(), ToString::to_string);
            let _ = writeln!(out, "{path} = {value}  # {source}");
        }
        out
    }
}

fn flatten<T: Serialize>(value: &T) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Ok(json) = serde_json::to_value(value) {
        walk(&json, "", &mut out);
    }
    out
}

fn walk(value: &serde_json::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                walk(child, &path, out);
            }
        },
        serde_json::Value::Null => {},
        other => out.push((prefix.to_owned(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    #[test]
    fn sources_listing_marks_layers() {
        let mut field_sources = FieldSources::new();
        field_sources.insert("agent.init_timeout_secs".into(), ConfigLayer::User);
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources,
            loaded_files: vec![],
        };
        let out = resolved.render(ShowFormat::Sources).unwrap();
        assert!(out.contains("agent.init_timeout_secs = 10  # user"));
        assert!(out.contains("agent.name = \"mcp\"  # defaults"));
        assert!(!out.contains("agent.worker_path"));
    }

    #[test]
    fn toml_and_json_render() {
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources: FieldSources::new(),
            loaded_files: vec![],
        };
        assert!(
            resolved
                .render(ShowFormat::Toml)
                .unwrap()
                .contains("[agent]")
        );
        assert!(
            resolved
                .render(ShowFormat::Json)
                .unwrap()
                .contains("\"startup_grace_millis\": 1000")
        );
    }
}
