//! In-memory worker backend and connector for supervisor tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use aria_agent::{
    Connector, LaunchedWorker, StartupError, WorkerBackend, WorkerHandle, WorkerReader,
    WorkerWriter,
};
use aria_core::{BackendKind, ExitNotifier, Generation, WorkerExit, exit_channel};
use aria_mcp::{ToolClient, TransportError, TransportResult};

use crate::mocks::MockToolClient;

#[derive(Debug, Default)]
struct FakeBackendState {
    launches: AtomicUsize,
    live: AtomicUsize,
    terminations: AtomicUsize,
    shutdowns: AtomicUsize,
    failing_launches: AtomicUsize,
    keep_running_on_terminate: AtomicBool,
    exits: Mutex<Vec<(Generation, ExitNotifier)>>,
}

impl FakeBackendState {
    fn notify_exit(&self, generation: Generation, exit: WorkerExit) -> bool {
        let Ok(exits) = self.exits.lock() else {
            return false;
        };
        exits
            .iter()
            .find(|(g, _)| *g == generation)
            .is_some_and(|(_, notifier)| notifier.notify(exit))
    }
}

/// Fake [`WorkerBackend`] that launches nothing but counts everything.
///
/// Each launch counts as one live worker until its handle is terminated or
/// dropped. Exits are triggered by the test with [`trigger_exit`](Self::trigger_exit).
#[derive(Debug, Clone)]
pub struct FakeBackend {
    kind: BackendKind,
    launch_delay: Option<Duration>,
    state: Arc<FakeBackendState>,
}

impl FakeBackend {
    /// Create a process-kind fake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: BackendKind::Process,
            launch_delay: None,
            state: Arc::new(FakeBackendState::default()),
        }
    }

    /// Report `kind` from [`WorkerBackend::kind`].
    #[must_use]
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Delay every launch.
    #[must_use]
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    /// Fail the next `count` launches with a spawn error.
    #[must_use]
    pub fn with_failing_launches(self, count: usize) -> Self {
        self.state.failing_launches.store(count, Ordering::SeqCst);
        self
    }

    /// Do not report an exit when a handle is terminated, leaving the exit
    /// to [`trigger_exit`](Self::trigger_exit).
    #[must_use]
    pub fn without_exit_on_terminate(self) -> Self {
        self.state
            .keep_running_on_terminate
            .store(true, Ordering::SeqCst);
        self
    }

    /// Report that the worker of `generation` stopped.
    ///
    /// Returns `false` if no such worker was launched or it already exited.
    pub fn trigger_exit(&self, generation: Generation, exit: WorkerExit) -> bool {
        self.state.notify_exit(generation, exit)
    }

    /// Successful launches so far.
    #[must_use]
    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Launched workers whose handle is neither terminated nor dropped.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Handles terminated so far.
    #[must_use]
    pub fn terminations(&self) -> usize {
        self.state.terminations.load(Ordering::SeqCst)
    }

    /// Calls to [`WorkerBackend::shutdown`].
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn launch(&self, generation: Generation) -> Result<LaunchedWorker, StartupError> {
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .state
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StartupError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "fake launch failure",
            )));
        }

        self.state.launches.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_add(1, Ordering::SeqCst);
        let (notifier, exit) = exit_channel();
        if let Ok(mut exits) = self.state.exits.lock() {
            exits.push((generation, notifier));
        }

        Ok(LaunchedWorker {
            reader: Box::new(tokio::io::empty()),
            writer: Box::new(tokio::io::sink()),
            handle: Box::new(FakeHandle {
                generation,
                released: false,
                state: Arc::clone(&self.state),
            }),
            exit,
        })
    }

    async fn shutdown(&self) {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeHandle {
    generation: Generation,
    released: bool,
    state: Arc<FakeBackendState>,
}

impl FakeHandle {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl WorkerHandle for FakeHandle {
    async fn terminate(self: Box<Self>) {
        let mut this = self;
        this.state.terminations.fetch_add(1, Ordering::SeqCst);
        this.release();
        if !this.state.keep_running_on_terminate.load(Ordering::SeqCst) {
            this.state.notify_exit(this.generation, WorkerExit::Terminated);
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

type ClientFactory = dyn Fn(Generation) -> MockToolClient + Send + Sync;

/// Fake [`Connector`] handing out one [`MockToolClient`] per session.
pub struct FakeConnector {
    factory: Box<ClientFactory>,
    failing_handshakes: AtomicUsize,
    clients: Mutex<Vec<(Generation, MockToolClient)>>,
}

impl FakeConnector {
    /// Create a connector building each session's client with `factory`.
    #[must_use]
    pub fn new(factory: impl Fn(Generation) -> MockToolClient + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            failing_handshakes: AtomicUsize::new(0),
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `count` handshakes.
    #[must_use]
    pub fn with_failing_handshakes(self, count: usize) -> Self {
        self.failing_handshakes.store(count, Ordering::SeqCst);
        self
    }

    /// The client handed out for `generation`.
    #[must_use]
    pub fn client(&self, generation: Generation) -> Option<MockToolClient> {
        self.clients.lock().ok().and_then(|clients| {
            clients
                .iter()
                .find(|(g, _)| *g == generation)
                .map(|(_, c)| c.clone())
        })
    }

    /// Number of successful handshakes.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl std::fmt::Debug for FakeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeConnector")
            .field("connections", &self.connections())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        generation: Generation,
        _reader: WorkerReader,
        _writer: WorkerWriter,
    ) -> TransportResult<Arc<dyn ToolClient>> {
        let failing = self
            .failing_handshakes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TransportError::Handshake("fake handshake failure".to_string()));
        }
        let client = (self.factory)(generation);
        if let Ok(mut clients) = self.clients.lock() {
            clients.push((generation, client.clone()));
        }
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launch_and_terminate_track_live_workers() {
        let backend = FakeBackend::new();
        let mut worker = backend.launch(Generation(1)).await.unwrap();
        assert_eq!(backend.live(), 1);

        worker.handle.terminate().await;
        assert_eq!(backend.live(), 0);
        assert_eq!(backend.terminations(), 1);
        assert_eq!(worker.exit.wait().await, WorkerExit::Terminated);
        assert!(!backend.trigger_exit(Generation(1), WorkerExit::Exited { code: Some(0) }));
    }

    #[tokio::test]
    async fn dropped_handle_is_released() {
        let backend = FakeBackend::new().without_exit_on_terminate();
        let worker = backend.launch(Generation(1)).await.unwrap();
        drop(worker);
        assert_eq!(backend.live(), 0);
        assert_eq!(backend.terminations(), 0);
    }

    #[tokio::test]
    async fn failing_launches_run_out() {
        let backend = FakeBackend::new().with_failing_launches(1);
        assert!(backend.launch(Generation(1)).await.is_err());
        assert!(backend.launch(Generation(2)).await.is_ok());
        assert_eq!(backend.launches(), 1);
    }

    #[tokio::test]
    async fn connector_records_clients() {
        let connector = FakeConnector::new(|_| MockToolClient::new()).with_failing_handshakes(1);
        let connect = || {
            connector.connect(
                Generation(1),
                Box::new(tokio::io::empty()),
                Box::new(tokio::io::sink()),
            )
        };
        assert!(connect().await.is_err());
        assert!(connect().await.is_ok());
        assert_eq!(connector.connections(), 1);
        assert!(connector.client(Generation(1)).is_some());
        assert!(connector.client(Generation(2)).is_none());
    }
}
