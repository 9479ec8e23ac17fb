//! Lazy, self-healing ownership of at most one worker session.
//!
//! The supervisor starts the worker on first use, restarts it on the next
//! call after it dies, and guarantees that only one session is attached at
//! any moment. Every session carries a [`Generation`]; anything that acts on
//! a session later (the exit watcher, a caller that hit a broken pipe)
//! names the generation it saw, and teardown only proceeds if that
//! generation is still the current one.
//!
//! Locking: `slot` guards the current session and is held only to read or
//! swap it, never across a start, a handshake or a tool call. `start_gate`
//! serializes start attempts, so concurrent cold callers share one attempt.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use aria_core::{BackendKind, ExitSignal, Generation};
use aria_mcp::{ToolClient, map_response};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{Connector, LaunchedWorker, WorkerBackend, WorkerHandle};
use crate::error::{AgentError, AgentResult, StartupError};

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No session; the next call starts one.
    Uninitialized,
    /// A start attempt is in progress.
    Starting,
    /// A session is attached.
    Ready {
        /// Generation of the attached session.
        generation: Generation,
    },
    /// Shut down for good.
    ShutDown,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Starting => f.write_str("starting"),
            Self::Ready { generation } => write!(f, "ready ({generation})"),
            Self::ShutDown => f.write_str("shut down"),
        }
    }
}

/// One live worker attempt.
struct WorkerSession {
    generation: Generation,
    client: Arc<dyn ToolClient>,
    handle: Box<dyn WorkerHandle>,
    exit: ExitSignal,
}

impl WorkerSession {
    /// Whether the worker or its transport is known to be gone.
    fn is_dead(&self) -> bool {
        self.client.is_closed() || self.exit.peek().is_some()
    }

    /// Close the transport, then stop the worker.
    async fn teardown(self, reason: &str) {
        let generation = self.generation;
        info!(%generation, reason, "tearing down worker session");
        self.client.close().await;
        self.handle.terminate().await;
        debug!(%generation, "worker session released");
    }
}

struct Inner {
    name: String,
    kind: BackendKind,
    backend: Arc<dyn WorkerBackend>,
    connector: Arc<dyn Connector>,
    slot: Mutex<Option<WorkerSession>>,
    start_gate: Arc<Mutex<()>>,
    starting: AtomicBool,
    shut_down: AtomicBool,
    last_generation: AtomicU64,
}

/// Owns the worker session and routes tool calls to it.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Inner>,
    call_timeout: Option<Duration>,
}

impl WorkerSupervisor {
    /// Create a supervisor. No worker is started until the first call.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn WorkerBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                kind: backend.kind(),
                backend,
                connector,
                slot: Mutex::new(None),
                start_gate: Arc::new(Mutex::new(())),
                starting: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                last_generation: AtomicU64::new(0),
            }),
            call_timeout: None,
        }
    }

    /// Apply `timeout` to every [`invoke`](Self::invoke).
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Backend kind.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.inner.kind
    }

    /// Call `tool`, starting or restarting the worker first if needed.
    ///
    /// # Errors
    ///
    /// - [`AgentError::NotReady`] if no session could be started
    /// - [`AgentError::Communication`] if the worker died during the call
    /// - [`AgentError::ToolCall`] for any other transport failure
    /// - [`AgentError::NotFound`] if the tool returned nothing usable
    /// - [`AgentError::Timeout`] if the configured call timeout elapsed
    /// - [`AgentError::ShutDown`] after [`shutdown`](Self::shutdown)
    pub async fn invoke(&self, tool: &str, arguments: Map<String, Value>) -> AgentResult<String> {
        self.call(tool, arguments, self.call_timeout).await
    }

    /// Like [`invoke`](Self::invoke) with an explicit deadline for this call.
    ///
    /// The deadline bounds only the wait for the response; the worker and
    /// its session are unaffected when it expires.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_with_deadline(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        deadline: Duration,
    ) -> AgentResult<String> {
        self.call(tool, arguments, Some(deadline)).await
    }

    /// Tear down the current session, if any. The supervisor stays usable
    /// and the next call starts a fresh worker.
    pub async fn close(&self) {
        let _gate = self.inner.start_gate.lock().await;
        let session = self.inner.slot.lock().await.take();
        if let Some(session) = session {
            session.teardown("closed").await;
        }
    }

    /// Tear down the current session and release the backend's shared
    /// state. Later calls fail with [`AgentError::ShutDown`]. Idempotent.
    pub async fn shutdown(&self) {
        let first = !self.inner.shut_down.swap(true, Ordering::SeqCst);
        let _gate = self.inner.start_gate.lock().await;
        let session = self.inner.slot.lock().await.take();
        if let Some(session) = session {
            session.teardown("shutdown").await;
        }
        if first {
            self.inner.backend.shutdown().await;
            info!(worker = %self.inner.name, "supervisor shut down");
        }
    }

    /// Current state.
    pub async fn state(&self) -> SupervisorState {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return SupervisorState::ShutDown;
        }
        if let Some(session) = self.inner.slot.lock().await.as_ref() {
            return SupervisorState::Ready {
                generation: session.generation,
            };
        }
        if self.inner.starting.load(Ordering::SeqCst) {
            SupervisorState::Starting
        } else {
            SupervisorState::Uninitialized
        }
    }

    /// Generation of the attached session, if any.
    pub async fn generation(&self) -> Option<Generation> {
        self.inner.slot.lock().await.as_ref().map(|s| s.generation)
    }

    async fn call(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        deadline: Option<Duration>,
    ) -> AgentResult<String> {
        let (generation, client) = self.ensure_ready().await?;

        let outcome = match deadline {
            Some(limit) => {
                if let Ok(outcome) =
                    tokio::time::timeout(limit, client.call_tool(tool, arguments)).await
                {
                    outcome
                } else {
                    warn!(worker = %self.inner.name, %generation, tool, "tool call timed out");
                    return Err(AgentError::Timeout {
                        tool: tool.to_string(),
                        after: limit,
                    });
                }
            },
            None => client.call_tool(tool, arguments).await,
        };

        match outcome {
            Ok(response) => map_response(tool, &response).map_err(AgentError::from),
            Err(err) if err.is_disconnect() => {
                error!(
                    worker = %self.inner.name,
                    %generation,
                    backend = %self.inner.kind,
                    tool,
                    error = %err,
                    "worker communication error"
                );
                self.inner
                    .teardown_if_current(generation, "communication fault")
                    .await;
                Err(AgentError::Communication(err))
            },
            Err(err) => {
                error!(worker = %self.inner.name, %generation, tool, error = %err, "failed to call MCP tool");
                Err(AgentError::ToolCall {
                    tool: tool.to_string(),
                    source: err,
                })
            },
        }
    }

    /// Return the live session's client, starting one if there is none.
    async fn ensure_ready(&self) -> AgentResult<(Generation, Arc<dyn ToolClient>)> {
        if let Some(ready) = self.inner.current().await? {
            return Ok(ready);
        }

        let gate = Arc::clone(&self.inner.start_gate).lock_owned().await;
        if let Some(ready) = self.inner.current().await? {
            return Ok(ready);
        }

        // The attempt runs detached so that a caller giving up mid-start
        // cannot strand a half-started worker.
        let inner = Arc::clone(&self.inner);
        let attempt = tokio::spawn(async move {
            let _gate = gate;
            inner.start().await
        });
        match attempt.await {
            Ok(result) => result,
            Err(e) => Err(AgentError::NotReady(StartupError::Aborted(e.to_string()))),
        }
    }
}

impl fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSupervisor")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// The attached session's client, unless it is already known dead.
    ///
    /// A session whose worker exited or whose transport closed is detached
    /// and torn down here, so a call arriving before the exit watcher fires
    /// still restarts.
    async fn current(&self) -> AgentResult<Option<(Generation, Arc<dyn ToolClient>)>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::ShutDown);
        }
        let stale = {
            let mut slot = self.slot.lock().await;
            if let Some(session) = slot.as_ref().filter(|s| !s.is_dead()) {
                return Ok(Some((session.generation, Arc::clone(&session.client))));
            }
            slot.take()
        };
        if let Some(session) = stale {
            session.teardown("transport closed").await;
        }
        Ok(None)
    }

    /// One start attempt. Runs with the start gate held.
    async fn start(self: Arc<Self>) -> AgentResult<(Generation, Arc<dyn ToolClient>)> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::ShutDown);
        }
        let generation = Generation(self.last_generation.fetch_add(1, Ordering::SeqCst)).next();
        info!(worker = %self.name, %generation, backend = %self.kind, "starting worker");

        self.starting.store(true, Ordering::SeqCst);
        let started = self.launch_and_connect(generation).await;
        self.starting.store(false, Ordering::SeqCst);
        let (client, handle, exit) = started?;

        let mut slot = self.slot.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            drop(slot);
            WorkerSession {
                generation,
                client,
                handle,
                exit,
            }
            .teardown("shut down during start")
            .await;
            return Err(AgentError::ShutDown);
        }
        let displaced = slot.replace(WorkerSession {
            generation,
            client: Arc::clone(&client),
            handle,
            exit: exit.clone(),
        });
        drop(slot);

        if let Some(old) = displaced {
            warn!(generation = %old.generation, "replacing a session that was still attached");
            old.teardown("replaced").await;
        }

        spawn_exit_watcher(Arc::downgrade(&self), generation, exit);
        info!(worker = %self.name, %generation, backend = %self.kind, "worker session ready");
        Ok((generation, client))
    }

    async fn launch_and_connect(
        &self,
        generation: Generation,
    ) -> AgentResult<(Arc<dyn ToolClient>, Box<dyn WorkerHandle>, ExitSignal)> {
        let LaunchedWorker {
            reader,
            writer,
            handle,
            exit,
        } = self.backend.launch(generation).await.map_err(|e| {
            error!(worker = %self.name, %generation, error = %e, "failed to start worker");
            AgentError::NotReady(e)
        })?;

        match self.connector.connect(generation, reader, writer).await {
            Ok(client) => Ok((client, handle, exit)),
            Err(e) => {
                error!(worker = %self.name, %generation, error = %e, "MCP initialize failed");
                handle.terminate().await;
                Err(AgentError::NotReady(StartupError::Handshake(e)))
            },
        }
    }

    /// Tear down the session only if it is still `generation`.
    ///
    /// Returns whether a teardown happened.
    async fn teardown_if_current(&self, generation: Generation, reason: &str) -> bool {
        let session = {
            let mut slot = self.slot.lock().await;
            if slot.as_ref().is_some_and(|s| s.generation == generation) {
                slot.take()
            } else {
                None
            }
        };
        match session {
            Some(session) => {
                session.teardown(reason).await;
                true
            },
            None => {
                debug!(%generation, reason, "session already replaced; nothing to tear down");
                false
            },
        }
    }
}

/// Watch one session's worker and tear the session down when it exits.
///
/// Holds only a weak reference, so a dropped supervisor is not kept alive.
fn spawn_exit_watcher(inner: Weak<Inner>, generation: Generation, mut exit: ExitSignal) {
    tokio::spawn(async move {
        let status = exit.wait().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        info!(worker = %inner.name, %generation, %status, "worker exited");
        inner.teardown_if_current(generation, "worker exited").await;
    });
}
