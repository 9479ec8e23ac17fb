use thiserror::Error;

/// Why the subscriber could not be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level or directive is not valid `EnvFilter` syntax.
    #[error("bad log filter '{input}': {reason}")]
    Filter {
        /// The offending text.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// The file appender could not be built, or a subscriber is already set.
    #[error("cannot install logger: {0}")]
    Install(String),

    /// The log directory could not be created.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
