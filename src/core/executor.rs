//! Shell execution for action commands.
//!
//! The async [`Executor`] backs the queued dispatch worker. The blocking
//! [`run_blocking`] backs the synchronous invoker, which runs inside the
//! host's own hook call and therefore cannot await anything.

use crate::core::error::{Error, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Output from a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the command, 1 if it was killed by a signal.
    pub exit_code: i32,
    /// Standard output, empty unless captured.
    pub stdout: String,
    /// Standard error, empty unless captured.
    pub stderr: String,
    /// Duration the command took to run.
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the command succeeded (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns combined stdout and stderr output.
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Whether to capture output. Otherwise the command writes to the
    /// host's stderr, with its stdout folded into it.
    pub capture_output: bool,
    /// Shell to use (default: sh on Unix, cmd on Windows).
    pub shell: Option<String>,
}

impl ExecuteOptions {
    /// Sets whether to capture output.
    #[must_use]
    pub const fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Sets the shell used to interpret the command line.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Returns the shell program and the flag that precedes the command line.
    fn shell_invocation(&self) -> (&str, &'static str) {
        if cfg!(windows) {
            (self.shell.as_deref().unwrap_or("cmd"), "/C")
        } else {
            (self.shell.as_deref().unwrap_or("sh"), "-c")
        }
    }

    /// Builds a std command for `command` with these options applied.
    fn std_command(&self, command: &str) -> std::process::Command {
        let (shell, shell_arg) = self.shell_invocation();
        let mut cmd = std::process::Command::new(shell);
        cmd.arg(shell_arg).arg(command);

        cmd.stdin(Stdio::null());
        if self.capture_output {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            // Host stdout may carry the forwarded event stream
            cmd.stdout(Stdio::from(std::io::stderr()));
            cmd.stderr(Stdio::inherit());
        }
        cmd
    }
}

/// Runs a shell command and blocks until the shell returns.
pub fn run_blocking(command: &str, options: &ExecuteOptions) -> Result<CommandOutput> {
    let start = Instant::now();
    let output = options
        .std_command(command)
        .output()
        .map_err(|e| Error::dispatch(command, e.to_string()))?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: start.elapsed(),
    })
}

/// Executor for running shell commands asynchronously.
#[derive(Debug, Default)]
pub struct Executor;

impl Executor {
    /// Creates a new executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Executes a shell command and waits for it to exit.
    pub async fn execute(&self, command: &str, options: &ExecuteOptions) -> Result<CommandOutput> {
        let start = Instant::now();

        let mut cmd = Command::from(options.std_command(command));
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::dispatch(command, e.to_string()))?;

        let (exit_code, stdout, stderr) = self
            .wait_for_output(&mut child, options.capture_output)
            .await
            .map_err(|e| Error::dispatch(command, e.to_string()))?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }

    /// Waits for the command to complete and captures output.
    async fn wait_for_output(
        &self,
        child: &mut tokio::process::Child,
        capture: bool,
    ) -> Result<(i32, String, String)> {
        if capture {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();

            let stdout_handle = tokio::spawn(async move {
                let mut output = String::new();
                if let Some(stdout) = stdout {
                    let mut reader = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        output.push_str(&line);
                        output.push('\n');
                    }
                }
                output
            });

            let stderr_handle = tokio::spawn(async move {
                let mut output = String::new();
                if let Some(stderr) = stderr {
                    let mut reader = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        output.push_str(&line);
                        output.push('\n');
                    }
                }
                output
            });

            let status = child.wait().await.map_err(|e| Error::io("wait for command", e))?;

            let stdout = stdout_handle.await.map_err(|e| Error::Internal {
                message: format!("stdout task failed: {e}"),
            })?;
            let stderr = stderr_handle.await.map_err(|e| Error::Internal {
                message: format!("stderr task failed: {e}"),
            })?;

            Ok((status.code().unwrap_or(1), stdout, stderr))
        } else {
            let status = child.wait().await.map_err(|e| Error::io("wait for command", e))?;
            Ok((status.code().unwrap_or(1), String::new(), String::new()))
        }
    }

    /// Checks if a program exists in PATH.
    #[must_use]
    pub fn command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }

    /// Returns the program name of a shell command line (its first word).
    #[must_use]
    pub fn program_of(command_line: &str) -> Option<&str> {
        command_line.split_whitespace().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured() -> ExecuteOptions {
        ExecuteOptions::default().capture_output(true)
    }

    #[test]
    fn test_run_blocking_captures_output() {
        let output = run_blocking("echo hello", &captured()).expect("should run");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[test]
    fn test_run_blocking_reports_exit_code() {
        let output = run_blocking("exit 3", &captured()).expect("should run");
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
    }

    #[test]
    fn test_run_blocking_missing_shell() {
        let options = captured().shell("definitely_not_a_real_shell_12345");
        let err = run_blocking("true", &options).expect_err("spawn should fail");
        assert!(matches!(err, Error::Dispatch { .. }));
    }

    #[test]
    fn test_run_blocking_uncaptured_leaves_output_empty() {
        let output = run_blocking("echo to-stderr", &ExecuteOptions::default()).expect("should run");
        assert!(output.success());
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let executor = Executor::new();
        let output = executor
            .execute("echo hello", &captured())
            .await
            .expect("should succeed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let executor = Executor::new();
        let output = executor
            .execute("exit 1", &captured())
            .await
            .expect("should complete");
        assert!(!output.success());
        assert_eq!(output.exit_code, 1);
    }

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            duration: Duration::ZERO,
        };
        assert_eq!(output.combined_output(), "out\nerr");
    }

    #[test]
    fn test_command_exists() {
        if cfg!(unix) {
            assert!(Executor::command_exists("sh"));
        }
        assert!(!Executor::command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_program_of() {
        assert_eq!(Executor::program_of("/bin/notify --table t"), Some("/bin/notify"));
        assert_eq!(Executor::program_of("   "), None);
    }
}
