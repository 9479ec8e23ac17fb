//! Common types used throughout Aria.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tag identifying one worker lifetime.
///
/// Every start attempt receives a fresh generation. Background watchers
/// carry the generation of the session they monitor and compare it against
/// the supervisor's current one before touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation that precedes every real session.
    pub const ZERO: Self = Self(0);

    /// The generation following this one.
    ///
    /// Saturates at `u64::MAX`; a supervisor would need to restart its worker
    /// continuously for millennia to get there.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Raw counter value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two ways a worker can be hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A native executable spawned as a child process.
    Process,
    /// A sandboxed WebAssembly module run inside the shared engine.
    Module,
}

impl BackendKind {
    /// Pick the backend for a worker path.
    ///
    /// A `.wasm` extension (case-insensitive) selects [`BackendKind::Module`];
    /// everything else runs as a native process.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wasm") => Self::Module,
            _ => Self::Process,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Module => write!(f, "module"),
        }
    }
}
