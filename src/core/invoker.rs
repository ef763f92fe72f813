//! Action invokers: what runs when a conflict is detected.
//!
//! The detector only sees the [`ActionInvoker`] trait. [`ShellInvoker`] runs the
//! command inline and blocks the hook call until the shell returns.
//! [`QueuedInvoker`] hands the command to a [`DispatchWorker`] task instead, for
//! hosts that would rather not block their event path on a child process.

use crate::core::error::{Error, Result};
use crate::core::executor::{run_blocking, CommandOutput, ExecuteOptions, Executor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The command ran to completion (successfully or not).
    Completed(CommandOutput),
    /// The command was handed to a background worker.
    Queued,
}

/// Runs the configured action command.
#[cfg_attr(test, mockall::automock)]
pub trait ActionInvoker: Send + Sync {
    /// Launches `command`, a shell-interpreted command line.
    ///
    /// Errors mean the command could not be started at all. A non-zero exit
    /// status is still a completed dispatch.
    fn invoke(&self, command: &str) -> Result<Dispatch>;
}

/// Runs commands through the platform shell, blocking until they exit.
#[derive(Debug, Clone, Default)]
pub struct ShellInvoker {
    options: ExecuteOptions,
}

impl ShellInvoker {
    /// Creates an invoker with default shell options (output inherited).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an invoker with explicit shell options.
    #[must_use]
    pub const fn with_options(options: ExecuteOptions) -> Self {
        Self { options }
    }
}

impl ActionInvoker for ShellInvoker {
    fn invoke(&self, command: &str) -> Result<Dispatch> {
        debug!(command, "running action command");
        run_blocking(command, &self.options).map(Dispatch::Completed)
    }
}

/// Queues commands for a [`DispatchWorker`] and returns immediately.
#[derive(Debug, Clone)]
pub struct QueuedInvoker {
    sender: mpsc::UnboundedSender<String>,
}

impl QueuedInvoker {
    /// Spawns the worker task on the current tokio runtime.
    ///
    /// The worker exits once every clone of the returned invoker is dropped
    /// and the queue is drained.
    #[must_use]
    pub fn spawn(options: ExecuteOptions) -> (Self, DispatchWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain(receiver, options));
        (Self { sender }, DispatchWorker { handle })
    }
}

impl ActionInvoker for QueuedInvoker {
    fn invoke(&self, command: &str) -> Result<Dispatch> {
        self.sender
            .send(command.to_string())
            .map_err(|_| Error::dispatch(command, "dispatch worker has stopped"))?;
        debug!(command, "queued action command");
        Ok(Dispatch::Queued)
    }
}

/// Background task running queued commands one at a time, in order.
#[derive(Debug)]
pub struct DispatchWorker {
    handle: JoinHandle<usize>,
}

impl DispatchWorker {
    /// Waits for the queue to drain and returns how many commands ran.
    pub async fn join(self) -> Result<usize> {
        self.handle.await.map_err(|e| Error::Internal {
            message: format!("dispatch worker failed: {e}"),
        })
    }
}

async fn drain(mut receiver: mpsc::UnboundedReceiver<String>, options: ExecuteOptions) -> usize {
    let executor = Executor::new();
    let mut executed = 0;

    while let Some(command) = receiver.recv().await {
        executed += 1;
        match executor.execute(&command, &options).await {
            Ok(output) if output.success() => {
                info!(
                    command = %command,
                    duration = %humantime::format_duration(output.duration),
                    "action command finished"
                );
            },
            Ok(output) => {
                warn!(
                    command = %command,
                    exit_code = output.exit_code,
                    output = %output.combined_output().trim_end(),
                    "action command exited with failure"
                );
            },
            Err(e) => warn!(command = %command, error = %e, "action command failed to run"),
        }
    }

    executed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_invoker_completes() {
        let invoker = ShellInvoker::with_options(ExecuteOptions::default().capture_output(true));
        let dispatch = invoker.invoke("echo dispatched").expect("should run");
        assert!(matches!(
            dispatch,
            Dispatch::Completed(ref output) if output.success() && output.stdout.contains("dispatched")
        ));
    }

    #[test]
    fn test_shell_invoker_nonzero_exit_is_not_an_error() {
        let invoker = ShellInvoker::with_options(ExecuteOptions::default().capture_output(true));
        let dispatch = invoker.invoke("exit 7").expect("should run");
        assert!(matches!(dispatch, Dispatch::Completed(ref o) if o.exit_code == 7));
    }

    #[tokio::test]
    async fn test_queued_invoker_runs_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("dispatch.log");
        let (invoker, worker) =
            QueuedInvoker::spawn(ExecuteOptions::default().capture_output(true));

        for n in 1..=3 {
            let command = format!("echo {n} >> '{}'", log.display());
            assert_eq!(invoker.invoke(&command).expect("queue"), Dispatch::Queued);
        }
        drop(invoker);

        assert_eq!(worker.join().await.expect("join"), 3);
        let content = std::fs::read_to_string(&log).expect("read log");
        assert_eq!(content, "1\n2\n3\n");
    }

    #[tokio::test]
    async fn test_queued_invoker_counts_failures() {
        let (invoker, worker) =
            QueuedInvoker::spawn(ExecuteOptions::default().capture_output(true));
        invoker.invoke("exit 1").expect("queue");
        drop(invoker);
        assert_eq!(worker.join().await.expect("join"), 1);
    }
}
