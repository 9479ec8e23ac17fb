//! Sandbox error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the sandbox runtime.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The engine could not be created.
    #[error("engine error: {0}")]
    Engine(String),

    /// The on-disk compilation cache could not be configured.
    #[error("failed to configure compilation cache: {0}")]
    Cache(String),

    /// Host functions could not be registered.
    #[error("failed to link host functions: {0}")]
    Link(String),

    /// The module file could not be read.
    #[error("failed to read module {path}: {source}")]
    ModuleRead {
        /// Path of the module.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The module failed to compile.
    #[error("failed to compile module: {0}")]
    Compile(String),

    /// A store for a new instance could not be prepared.
    #[error("failed to prepare instance: {0}")]
    Instance(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The context was shut down.
    #[error("sandbox context has been shut down")]
    ShutDown,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
