//! Worker termination signalling.
//!
//! Each launched worker carries an [`ExitSignal`] that resolves once the
//! underlying process or module instance has really stopped. The backend
//! holds the matching [`ExitNotifier`]; the first reported exit wins.

use std::fmt;
use tokio::sync::watch;

/// How a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker ran to completion. `code` is `None` when the platform
    /// reported no exit code (e.g. killed by a signal).
    Exited {
        /// Exit status code.
        code: Option<i32>,
    },
    /// The worker stopped because of an error.
    Failed(String),
    /// The host terminated the worker.
    Terminated,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code: Some(code) } => write!(f, "exited with code {code}"),
            Self::Exited { code: None } => write!(f, "exited without a status code"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Terminated => write!(f, "terminated by host"),
        }
    }
}

/// Create a connected notifier/signal pair.
#[must_use]
pub fn exit_channel() -> (ExitNotifier, ExitSignal) {
    let (tx, rx) = watch::channel(None);
    (ExitNotifier { tx }, ExitSignal { rx })
}

/// Sending half, owned by whatever observes the worker's real termination.
#[derive(Debug)]
pub struct ExitNotifier {
    tx: watch::Sender<Option<WorkerExit>>,
}

impl ExitNotifier {
    /// Record the exit. Returns `false` if an exit was already recorded.
    pub fn notify(&self, exit: WorkerExit) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(exit);
                true
            } else {
                false
            }
        })
    }
}

/// Receiving half. Cloneable so that both the startup check and the
/// watcher can observe the same exit.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<WorkerExit>>,
}

impl ExitSignal {
    /// Wait until the worker has stopped.
    ///
    /// If the notifier is dropped without reporting, the worker is treated
    /// as failed.
    pub async fn wait(&mut self) -> WorkerExit {
        match self.rx.wait_for(Option::is_some).await {
            Ok(exit) => exit
                .clone()
                .unwrap_or_else(|| WorkerExit::Failed("exit state lost".to_string())),
            Err(_) => WorkerExit::Failed("exit notifier dropped".to_string()),
        }
    }

    /// The exit, if one has been recorded already.
    #[must_use]
    pub fn peek(&self) -> Option<WorkerExit> {
        self.rx.borrow().clone()
    }
}
