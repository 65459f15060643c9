//! Command execution
//!
//! Implement [`CommandExecutor`] to define how a resolved `TEST` command is
//! run. [`ShellExecutor`] hands it to `<shell> -c`.
//!
//! The verdict comes from the shell's exit status alone. Output pipes are
//! drained concurrently and may outlive the shell when a background process
//! inherits them, so collection stops shortly after the status is in.

use crate::config::RunConfig;
use crate::error::ExecutorError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long output is still collected after the shell exits
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Outcome of running one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal or timed out
    pub exit_code: Option<i32>,
    /// Captured stdout, possibly truncated
    pub stdout: String,
    /// Captured stderr, possibly truncated
    pub stderr: String,
    /// Killed after exceeding the timeout
    pub timed_out: bool,
    /// Wall-clock time
    pub duration: Duration,
}

impl CommandOutput {
    /// Exited with status 0
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Command executor trait
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command`, killing it after `timeout`
    ///
    /// A timeout is reported through [`CommandOutput::timed_out`], not as an
    /// error.
    async fn execute(&self, command: &str, timeout: Duration)
        -> Result<CommandOutput, ExecutorError>;
}

/// Runs commands through a system shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    working_dir: PathBuf,
    max_output_bytes: usize,
}

impl ShellExecutor {
    /// Create executor for `shell`
    #[must_use]
    pub fn new(shell: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            working_dir: working_dir.into(),
            max_output_bytes: RunConfig::default().max_output_bytes,
        }
    }

    /// Create executor from run configuration
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.shell.clone(), config.working_dir.clone())
            .with_max_output_bytes(config.max_output_bytes)
    }

    /// With per-stream capture limit
    #[inline]
    #[must_use]
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        let started = Instant::now();
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        let stdout = PipeReader::spawn(child.stdout.take(), self.max_output_bytes);
        let stderr = PipeReader::spawn(child.stderr.take(), self.max_output_bytes);

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let (exit_code, timed_out) = match waited {
            Ok(status) => (status.map_err(ExecutorError::Wait)?.code(), false),
            Err(_) => {
                tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
                if let Err(err) = child.start_kill() {
                    tracing::debug!(error = %err, "failed to kill timed out command");
                }
                (None, true)
            }
        };

        Ok(CommandOutput {
            exit_code,
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            timed_out,
            duration: started.elapsed(),
        })
    }
}

#[derive(Debug, Default)]
struct Capture {
    kept: Vec<u8>,
    total: usize,
}

/// Background reader keeping at most `max` bytes of one pipe
struct PipeReader {
    capture: Arc<Mutex<Capture>>,
    task: Option<JoinHandle<()>>,
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>, max: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let task = pipe.map(|mut pipe| {
            let capture = Arc::clone(&capture);
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                // Keep reading past `max` so the writer never blocks on a full pipe.
                while let Ok(n) = pipe.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    let mut capture = capture.lock();
                    let room = max.saturating_sub(capture.kept.len());
                    capture.kept.extend_from_slice(&buf[..n.min(room)]);
                    capture.total += n;
                }
            })
        });
        Self { capture, task }
    }

    /// Wait briefly for EOF, then decode whatever was captured
    async fn finish(self) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                tracing::debug!("output pipe still open after exit, stopped collecting");
                task.abort();
            }
        }
        let capture = self.capture.lock();
        captured_text(&capture.kept, capture.total)
    }
}

/// Decode captured bytes, noting how many of `total` were discarded
#[must_use]
pub fn captured_text(kept: &[u8], total: usize) -> String {
    let mut text = String::from_utf8_lossy(kept).into_owned();
    if total > kept.len() {
        text.push_str(&format!("\n[truncated {} bytes]", total - kept.len()));
    }
    text
}
