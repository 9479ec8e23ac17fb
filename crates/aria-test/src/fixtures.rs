//! Test fixtures for common types.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use aria_mcp::ArtistArgs;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::util::SubscriberInitExt;

/// MusicBrainz id used by [`test_artist`].
pub const TEST_MBID: &str = "5b11f4ce-a62d-471e-81fc-a69a8278c7da";

/// Create artist arguments with all three fields set.
#[must_use]
pub fn test_artist() -> ArtistArgs {
    ArtistArgs::new("1", "Nirvana").with_mbid(TEST_MBID)
}

/// Create artist arguments without an mbid.
#[must_use]
pub fn test_artist_without_mbid(name: &str) -> ArtistArgs {
    ArtistArgs::new("2", name)
}

/// Create a temp directory and a path for a config file inside it.
///
/// The directory is removed when the returned [`TempDir`] is dropped.
///
/// # Panics
///
/// Panics if the temp directory cannot be created.
#[must_use]
#[allow(clippy::expect_used)]
pub fn temp_config_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("config.toml");
    (dir, path)
}

/// Install a test log subscriber honoring `RUST_LOG`.
///
/// Safe to call from many tests; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log output recorded by [`capture_logs`], without colors.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Record every event on the current thread until the guard drops.
///
/// Use with a current-thread runtime so spawned tasks log here too.
#[must_use]
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let guard = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish()
        .set_default();
    (logs, guard)
}
