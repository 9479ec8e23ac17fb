use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file that had to exist was absent.
    #[error("config file {} does not exist", path.display())]
    Missing {
        /// The file.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: io::Error,
    },

    /// A file is larger than any sane config.
    #[error("{} is {size} bytes; configs are capped at {limit}", path.display())]
    TooLarge {
        /// The file.
        path: PathBuf,
        /// Its size.
        size: usize,
        /// The cap.
        limit: usize,
    },

    /// TOML syntax or type mismatch. `origin` is a path or a label such as
    /// `<embedded defaults>`.
    #[error("invalid TOML in {origin}: {source}")]
    Parse {
        /// Where the text came from.
        origin: String,
        /// Parser cause.
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is out of range.
    #[error("{field}: {message}")]
    Invalid {
        /// Dotted field path, e.g. `agent.call_timeout_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// An `ARIA_*` variable held an unusable value.
    #[error("${var}: {message}")]
    Env {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory to look for the user config in.
    #[error("no home directory; set ARIA_HOME or pass --config")]
    NoHomeDir,
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(origin: impl Into<String>, source: toml::de::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }

    /// Dotted field path for [`ConfigError::Invalid`].
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
