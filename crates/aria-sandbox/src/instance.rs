//! Module instances running a worker's entry point.
//!
//! Each instance gets its own store and a pair of in-memory pipes standing
//! in for stdin and stdout; stderr goes straight to the host's stderr. The
//! entry point runs on its own task, which owns the store and the instance
//! lease and releases both the moment the entry point returns or the
//! instance is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aria_core::{ExitNotifier, ExitSignal, Generation, WorkerExit, exit_channel};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wasmtime::{Linker, Module, Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::pipe::{AsyncReadStream, AsyncWriteStream};
use wasmtime_wasi::{AsyncStdinStream, AsyncStdoutStream, I32Exit, WasiCtxBuilder};

use crate::context::{ModuleState, SharedExecutionContext};
use crate::error::SandboxResult;

/// Pipe buffer size for the emulated stdio streams.
const STDIO_BUFFER: usize = 65_536;

/// Exported entry point.
const ENTRY_POINT: &str = "_start";

/// A started module instance.
///
/// `stdin` is the host's write end of the guest's standard input, `stdout`
/// the host's read end of its standard output. Dropping `stdin` is seen by
/// the guest as end of input.
#[derive(Debug)]
pub struct ModuleInstance {
    /// Host write end of the guest's stdin.
    pub stdin: DuplexStream,
    /// Host read end of the guest's stdout.
    pub stdout: DuplexStream,
    /// Resolves when the entry point has returned and resources are released.
    pub exit: ExitSignal,
    /// Termination handle.
    pub control: InstanceControl,
}

/// Termination handle for a running instance.
#[derive(Debug)]
pub struct InstanceControl {
    generation: Generation,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl InstanceControl {
    /// Cancel the instance and wait up to `grace` for its task to finish,
    /// aborting it afterwards.
    pub async fn terminate(mut self, grace: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            warn!(generation = %self.generation, "module instance did not stop in time; aborting");
            self.task.abort();
        }
    }

    /// Whether the instance task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Holds one slot of the context's live-instance count, plus the module
/// handle the instance was created from.
struct InstanceLease {
    live: Arc<AtomicUsize>,
    _module: Module,
}

impl InstanceLease {
    fn acquire(live: Arc<AtomicUsize>, module: Module) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            live,
            _module: module,
        }
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SharedExecutionContext {
    /// Start a new instance of the worker module for `generation`.
    ///
    /// Returns as soon as the entry point task is running; use the returned
    /// [`ExitSignal`] to learn when it stops.
    ///
    /// # Errors
    ///
    /// Fails if the context is shut down or the module cannot be compiled.
    pub async fn spawn_instance(&self, generation: Generation) -> SandboxResult<ModuleInstance> {
        let module = self.module_for_session().await?;
        let worker = self.settings().worker_name.clone();

        let (host_stdin, guest_stdin) = tokio::io::duplex(STDIO_BUFFER);
        let (guest_stdout, host_stdout) = tokio::io::duplex(STDIO_BUFFER);
        let wasi = WasiCtxBuilder::new()
            .stdin(AsyncStdinStream::new(AsyncReadStream::new(guest_stdin)))
            .stdout(AsyncStdoutStream::new(AsyncWriteStream::new(
                STDIO_BUFFER,
                guest_stdout,
            )))
            .inherit_stderr()
            .arg(&worker)
            .build_p1();

        let limits = match self.settings().max_memory_bytes {
            Some(max) => StoreLimitsBuilder::new()
                .memory_size(usize::try_from(max).unwrap_or(usize::MAX))
                .build(),
            None => StoreLimits::default(),
        };
        let mut store = Store::new(self.engine(), ModuleState::new(wasi, self.bridge(), limits));
        store.limiter(|state| state.limits_mut());

        let lease = InstanceLease::acquire(Arc::clone(&self.live), module.clone());
        let (notifier, exit) = exit_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_instance(
            worker,
            generation,
            self.linker(),
            store,
            module,
            lease,
            cancel.clone(),
            notifier,
        ));
        debug!(%generation, "module instance started");

        Ok(ModuleInstance {
            stdin: host_stdin,
            stdout: host_stdout,
            exit,
            control: InstanceControl {
                generation,
                cancel,
                task,
            },
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_instance(
    worker: String,
    generation: Generation,
    linker: Arc<Linker<ModuleState>>,
    store: Store<ModuleState>,
    module: Module,
    lease: InstanceLease,
    cancel: CancellationToken,
    notifier: ExitNotifier,
) {
    let outcome = tokio::select! {
        result = run_entry_point(&linker, store, module) => classify_exit(result),
        () = cancel.cancelled() => WorkerExit::Terminated,
    };
    drop(lease);

    match &outcome {
        WorkerExit::Failed(reason) => {
            warn!(worker, %generation, %reason, "module instance failed");
        },
        other => info!(worker, %generation, exit = %other, "module instance stopped"),
    }
    notifier.notify(outcome);
}

async fn run_entry_point(
    linker: &Linker<ModuleState>,
    mut store: Store<ModuleState>,
    module: Module,
) -> wasmtime::Result<()> {
    let instance = linker.instantiate_async(&mut store, &module).await?;
    let start = instance.get_typed_func::<(), ()>(&mut store, ENTRY_POINT)?;
    start.call_async(&mut store, ()).await
}

fn classify_exit(result: wasmtime::Result<()>) -> WorkerExit {
    match result {
        Ok(()) => WorkerExit::Exited { code: Some(0) },
        Err(err) => match err.downcast_ref::<I32Exit>() {
            Some(exit) => WorkerExit::Exited { code: Some(exit.0) },
            None => WorkerExit::Failed(format!("{err:#}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostFunctionBridge, ModuleSource, SandboxSettings};
    use aria_core::{AllowAllGate, FetchResult};
    use aria_test::MockFetcher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const EXIT_AT_ONCE: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start")))
    "#;

    const EXIT_THREE: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
          (memory (export "memory") 1)
          (func (export "_start") (call $exit (i32.const 3))))
    "#;

    const TRAP: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start") unreachable))
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

    const FETCH: &str = r#"
        (module
          (import "env" "http_fetch"
            (func $fetch (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 0) "https://example.org/artist")
          (func (export "_start")
            (if (i32.ne
                  (call $fetch
                    (i32.const 0) (i32.const 26)
                    (i32.const 0) (i32.const 0)
                    (i32.const 0) (i32.const 0)
                    (i32.const 0)
                    (i32.const 64)
                    (i32.const 128) (i32.const 256) (i32.const 68)
                    (i32.const 512) (i32.const 128) (i32.const 72))
                  (i32.const 0))
              (then unreachable))
            (if (i32.ne (i32.load (i32.const 64)) (i32.const 200)) (then unreachable))
            (if (i32.ne (i32.load (i32.const 68)) (i32.const 5)) (then unreachable))
            (if (i32.ne (i32.load (i32.const 72)) (i32.const 0)) (then unreachable))))
    "#;

    async fn context(wat: &str, fetcher: MockFetcher) -> SharedExecutionContext {
        let settings = SandboxSettings::new("mcp", ModuleSource::Bytes(Arc::from(wat.as_bytes())));
        let bridge = HostFunctionBridge::new("mcp", Arc::new(AllowAllGate), Arc::new(fetcher));
        SharedExecutionContext::new(settings, bridge).await.unwrap()
    }

    #[tokio::test]
    async fn immediate_exit_releases_instance() {
        let ctx = context(EXIT_AT_ONCE, MockFetcher::new()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();

        assert_eq!(instance.exit.wait().await, WorkerExit::Exited { code: Some(0) });
        assert_eq!(ctx.live_instances(), 0);
    }

    #[tokio::test]
    async fn proc_exit_code_is_reported() {
        let ctx = context(EXIT_THREE, MockFetcher::new()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();
        assert_eq!(instance.exit.wait().await, WorkerExit::Exited { code: Some(3) });
    }

    #[tokio::test]
    async fn trap_is_a_failure() {
        let ctx = context(TRAP, MockFetcher::new()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();
        assert!(matches!(instance.exit.wait().await, WorkerExit::Failed(_)));
        assert_eq!(ctx.live_instances(), 0);
    }

    #[tokio::test]
    async fn stdio_pipes_round_trip_until_eof() {
        let ctx = context(ECHO, MockFetcher::new()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();

        instance.stdin.write_all(b"ping\n").await.unwrap();
        let mut buf = [0u8; 5];
        instance.stdout.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping\n");
        assert!(instance.exit.peek().is_none());
        assert_eq!(ctx.live_instances(), 1);

        drop(instance.stdin);
        assert_eq!(instance.exit.wait().await, WorkerExit::Exited { code: Some(0) });
        assert_eq!(ctx.live_instances(), 0);
    }

    #[tokio::test]
    async fn terminate_cancels_blocked_instance() {
        let ctx = context(ECHO, MockFetcher::new()).await;
        let instance = ctx.spawn_instance(Generation(2)).await.unwrap();
        let mut exit = instance.exit.clone();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(exit.peek().is_none());

        instance.control.terminate(Duration::from_secs(2)).await;
        assert_eq!(exit.wait().await, WorkerExit::Terminated);
        assert_eq!(ctx.live_instances(), 0);
    }

    #[tokio::test]
    async fn guest_calls_http_fetch() {
        let fetcher = MockFetcher::new().with_result(FetchResult::success(200, b"hello".to_vec()));
        let ctx = context(FETCH, fetcher.clone()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();

        assert_eq!(instance.exit.wait().await, WorkerExit::Exited { code: Some(0) });
        let requests = fetcher.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].url, "https://example.org/artist");
        assert_eq!(requests[0].timeout, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn instances_survive_context_shutdown() {
        let ctx = context(ECHO, MockFetcher::new()).await;
        let mut instance = ctx.spawn_instance(Generation(1)).await.unwrap();
        ctx.shutdown().await;

        instance.stdin.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        instance.stdout.read_exact(&mut buf).await.unwrap();
        drop(instance.stdin);
        instance.exit.wait().await;
        assert_eq!(ctx.live_instances(), 0);
    }
}
