//! Where Aria keeps files on disk.
//!
//! ```text
//! $ARIA_HOME or ~/.aria/
//! ├── config.toml
//! └── data/
//!     └── cache/wasm/     compiled worker modules
//! ```
//!
//! `[sandbox] data_dir` replaces `data/` when set.

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable that relocates the Aria home directory.
pub const HOME_ENV: &str = "ARIA_HOME";

/// The Aria home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AriaHome {
    root: PathBuf,
}

impl AriaHome {
    /// Resolve from the process environment.
    ///
    /// # Errors
    ///
    /// See [`AriaHome::resolve_with`].
    pub fn resolve() -> io::Result<Self> {
        Self::resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` to read environment variables.
    ///
    /// A non-empty `ARIA_HOME` wins; otherwise `.aria` under `HOME`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `ARIA_HOME` is relative, `NotFound` if neither
    /// variable is set.
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        if let Some(custom) = lookup(HOME_ENV).filter(|v| !v.is_empty()) {
            let root = PathBuf::from(custom);
            if !root.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{HOME_ENV} must be absolute, got {}", root.display()),
                ));
            }
            return Ok(Self { root });
        }

        lookup("HOME")
            .filter(|v| !v.is_empty())
            .map(|home| Self {
                root: Path::new(&home).join(".aria"),
            })
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("neither {HOME_ENV} nor HOME is set"))
            })
    }

    /// Use `root` as-is.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `config.toml` in the home directory.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Default data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}

/// Compile cache for worker modules under `data_dir`.
#[must_use]
pub fn wasm_cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("cache").join("wasm")
}
