//! Sandboxed worker modules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aria_core::{BackendKind, Generation};
use aria_sandbox::{InstanceControl, ModuleInstance, SharedExecutionContext};
use tracing::{debug, warn};

use crate::backend::{LaunchedWorker, WorkerBackend, WorkerHandle};
use crate::error::StartupError;

/// Runs the worker as a module instance inside a [`SharedExecutionContext`].
///
/// The context outlives every session and is released only by
/// [`shutdown`](WorkerBackend::shutdown).
#[derive(Debug, Clone)]
pub struct ModuleBackend {
    context: Arc<SharedExecutionContext>,
    startup_grace: Duration,
    shutdown_timeout: Duration,
}

impl ModuleBackend {
    /// Create a backend over `context`.
    #[must_use]
    pub fn new(context: Arc<SharedExecutionContext>) -> Self {
        Self {
            context,
            startup_grace: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    /// How long the entry point must keep running before the instance
    /// counts as started.
    #[must_use]
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// How long a cancelled instance gets before its task is aborted.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<SharedExecutionContext> {
        &self.context
    }
}

#[async_trait]
impl WorkerBackend for ModuleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Module
    }

    async fn launch(&self, generation: Generation) -> Result<LaunchedWorker, StartupError> {
        let ModuleInstance {
            stdin,
            stdout,
            exit,
            control,
        } = self
            .context
            .spawn_instance(generation)
            .await
            .map_err(StartupError::Instantiate)?;

        // The entry point serves until stdin closes; returning inside the
        // grace window means it never started serving.
        let mut early_exit = exit.clone();
        if let Ok(status) = tokio::time::timeout(self.startup_grace, early_exit.wait()).await {
            warn!(%generation, %status, "worker module exited during startup");
            return Err(StartupError::ExitedEarly(status.to_string()));
        }
        debug!(%generation, "worker module entry point is running");

        Ok(LaunchedWorker {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            handle: Box::new(ModuleHandle {
                control,
                shutdown_timeout: self.shutdown_timeout,
            }),
            exit,
        })
    }

    async fn shutdown(&self) {
        self.context.shutdown().await;
    }
}

struct ModuleHandle {
    control: InstanceControl,
    shutdown_timeout: Duration,
}

#[async_trait]
impl WorkerHandle for ModuleHandle {
    async fn terminate(self: Box<Self>) {
        let Self {
            control,
            shutdown_timeout,
        } = *self;
        control.terminate(shutdown_timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::{AllowAllGate, WorkerExit};
    use aria_sandbox::{HostFunctionBridge, ModuleSource, SandboxSettings};
    use aria_test::MockFetcher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const EXIT_AT_ONCE: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start")))
    "#;

    const ECHO: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "fd_read"
            (func $fd_read (param i32 i32 i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (func (export "_start")
            (i32.store (i32.const 0) (i32.const 16))
            (block $done
              (loop $read
                (i32.store (i32.const 4) (i32.const 64))
                (br_if $done (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
                (br_if $done (i32.eqz (i32.load (i32.const 8))))
                (i32.store (i32.const 4) (i32.load (i32.const 8)))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 12)))
                (br $read)))))
    "#;

    async fn backend(wat: &str) -> ModuleBackend {
        let settings = SandboxSettings::new("mcp", ModuleSource::Bytes(Arc::from(wat.as_bytes())));
        let bridge = HostFunctionBridge::new("mcp", Arc::new(AllowAllGate), Arc::new(MockFetcher::new()));
        let context = SharedExecutionContext::new(settings, bridge).await.unwrap();
        ModuleBackend::new(Arc::new(context)).with_startup_grace(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn immediate_exit_is_startup_failure() {
        let backend = backend(EXIT_AT_ONCE).await;
        let err = backend.launch(Generation(1)).await.unwrap_err();
        assert!(matches!(err, StartupError::ExitedEarly(_)));
        assert_eq!(backend.context().live_instances(), 0);
    }

    #[tokio::test]
    async fn blocking_entry_point_launches() {
        let backend = backend(ECHO).await;
        let mut worker = backend.launch(Generation(1)).await.unwrap();

        worker.writer.write_all(b"hi\n").await.unwrap();
        let mut buf = [0u8; 3];
        worker.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi\n");

        let mut exit = worker.exit.clone();
        worker.handle.terminate().await;
        assert_eq!(exit.wait().await, WorkerExit::Terminated);
        assert_eq!(backend.context().live_instances(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_shared_context() {
        let backend = backend(ECHO).await;
        backend.shutdown().await;
        assert!(backend.context().is_shut_down());
        assert!(matches!(
            backend.launch(Generation(1)).await,
            Err(StartupError::Instantiate(_))
        ));
    }
}
