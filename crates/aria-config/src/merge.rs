//! Layered merging of TOML documents with per-field source tracking.

use std::collections::BTreeMap;
use std::fmt;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `/etc/aria/config.toml`.
    System,
    /// The user's home config.
    User,
    /// `{workspace}/.aria/config.toml`.
    Workspace,
    /// A file named explicitly on the command line.
    Explicit,
    /// An environment variable fallback.
    Env(String),
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Workspace => write!(f, "workspace"),
            Self::Explicit => write!(f, "explicit"),
            Self::Env(var) => write!(f, "env:{var}"),
        }
    }
}

/// Dotted field path (e.g. `agent.worker_path`) to the layer that set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Deep-merge `overlay` into `base`, recording which layer set each leaf.
///
/// Tables merge per key; scalars and arrays from the overlay replace the
/// base value.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = child_path(prefix, key);
                match base_table.get_mut(key) {
                    Some(base_val) if overlay_val.is_table() => {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    },
                    Some(base_val) => {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    },
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, layer, sources);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Record every leaf under `val` as coming from `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &child_path(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

/// Set a dotted path in `root`, creating intermediate tables.
///
/// Returns `false` when an intermediate segment exists but is not a table.
pub fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) -> bool {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let toml::Value::Table(table) = current else {
            return false;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return true;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn overlay_replaces_scalars_and_merges_tables() {
        let mut base = parse("[agent]\nname = \"mcp\"\ninit_timeout_secs = 10\n");
        let overlay = parse("[agent]\ninit_timeout_secs = 30\n[fetch]\nuser_agent = \"x\"\n");
        let mut sources = FieldSources::new();
        record_leaves(&base, "", &ConfigLayer::Defaults, &mut sources);
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(base["agent"]["name"].as_str(), Some("mcp"));
        assert_eq!(base["agent"]["init_timeout_secs"].as_integer(), Some(30));
        assert_eq!(base["fetch"]["user_agent"].as_str(), Some("x"));
        assert_eq!(sources.get("agent.name"), Some(&ConfigLayer::Defaults));
        assert_eq!(
            sources.get("agent.init_timeout_secs"),
            Some(&ConfigLayer::User)
        );
        assert_eq!(sources.get("fetch.user_agent"), Some(&ConfigLayer::User));
    }

    #[test]
    fn arrays_are_replaced_not_appended() {
        let mut base = parse("[sandbox]\nallow_hosts = [\"a\", \"b\"]\n");
        let overlay = parse("[sandbox]\nallow_hosts = [\"c\"]\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::Workspace, &mut sources);
        assert_eq!(base["sandbox"]["allow_hosts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn set_path_creates_tables() {
        let mut root = toml::Value::Table(toml::map::Map::new());
        assert!(set_path(
            &mut root,
            "agent.worker_path",
            toml::Value::String("/bin/w".into())
        ));
        assert_eq!(root["agent"]["worker_path"].as_str(), Some("/bin/w"));

        let mut scalar_parent = parse("agent = 1\n");
        assert!(!set_path(
            &mut scalar_parent,
            "agent.name",
            toml::Value::String("x".into())
        ));
    }
}
