//! Native worker processes.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use aria_core::{BackendKind, ExitNotifier, Generation, WorkerExit, exit_channel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{LaunchedWorker, WorkerBackend, WorkerHandle};
use crate::error::StartupError;

/// Log target for lines a worker writes to stderr.
pub const WORKER_LOG_TARGET: &str = "aria::worker";

/// Runs the worker as a child process speaking MCP on stdin/stdout.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    kill_grace: Duration,
}

impl ProcessBackend {
    /// Create a backend for `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            kill_grace: Duration::from_secs(2),
        }
    }

    /// How long to wait for the process to exit after killing it.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Path of the worker executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl WorkerBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn launch(&self, generation: Generation) -> Result<LaunchedWorker, StartupError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(StartupError::Spawn)?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StartupError::Spawn(io::Error::other("worker stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StartupError::Spawn(io::Error::other("worker stdout not captured")))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(generation, stderr));
        }

        let (notifier, exit) = exit_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_child(child, kill_rx, notifier, generation));

        info!(
            program = %self.program.display(),
            pid = pid.unwrap_or_default(),
            %generation,
            "worker process started"
        );

        Ok(LaunchedWorker {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            handle: Box::new(ProcessHandle {
                generation,
                kill: Some(kill_tx),
                monitor,
                kill_grace: self.kill_grace,
            }),
            exit,
        })
    }

    async fn shutdown(&self) {}
}

/// Termination handle for one worker process.
///
/// The child itself is owned by its monitor task; the handle only asks the
/// monitor to kill it. Dropping the handle has the same effect.
struct ProcessHandle {
    generation: Generation,
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
    kill_grace: Duration,
}

#[async_trait]
impl WorkerHandle for ProcessHandle {
    async fn terminate(mut self: Box<Self>) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        if tokio::time::timeout(self.kill_grace, &mut self.monitor)
            .await
            .is_err()
        {
            warn!(generation = %self.generation, "worker process did not exit in time");
            self.monitor.abort();
        }
    }
}

/// Own the child until it exits, on its own or on request.
async fn monitor_child(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    notifier: ExitNotifier,
    generation: Generation,
) {
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => WorkerExit::Exited { code: status.code() },
            Err(e) => WorkerExit::Failed(e.to_string()),
        },
        _ = kill => {
            if let Err(e) = child.start_kill() {
                debug!(%generation, error = %e, "kill failed; process already gone");
            }
            match child.wait().await {
                Ok(_) => WorkerExit::Terminated,
                Err(e) => WorkerExit::Failed(e.to_string()),
            }
        },
    };
    info!(%generation, %exit, "worker process stopped");
    notifier.notify(exit);
}

async fn forward_stderr(generation: Generation, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: WORKER_LOG_TARGET, %generation, "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(%generation, error = %e, "worker stderr closed");
                break;
            },
        }
    }
}
