//! Running external programs.
//!
//! All toolchain invocations go through the [`CommandRunner`] trait. The
//! production [`TokioRunner`] never involves a shell: the program is executed
//! directly with an argument vector, stdin is closed, and both output streams
//! are captured.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long to keep collecting output after a timed-out child was killed.
/// Grandchildren may still hold the pipes open.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Kill the child once this much time has passed.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Executable that was invoked.
    pub command: String,
    /// Argument vector, excluding the program itself.
    pub args: Vec<String>,
    /// Exit code; `None` when the process was killed or never started.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Whether the invocation was cut short by its timeout.
    pub timed_out: bool,
}

impl RunOutput {
    /// A synthetic output for a program that could not be started.
    pub fn spawn_failure(program: &Path, args: &[String], err: &Error) -> Self {
        Self {
            command: program.to_string_lossy().into_owned(),
            args: args.to_vec(),
            code: None,
            stdout: String::new(),
            stderr: err.to_string(),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr (newline separated when stderr is non-empty).
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes external programs.
///
/// Implementations must be `Send + Sync`: the orchestrator and toolchain
/// probes share a single runner across concurrent tasks.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    /// Runs `program` with `args` to completion (or timeout).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when the program cannot be started. A non-zero
    /// exit code or a timeout is *not* an error.
    async fn run(&self, program: &Path, args: &[String], opts: &RunOptions) -> Result<RunOutput>;
}

/// Default [`CommandRunner`] built on `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioRunner;

async fn drain<R: AsyncRead + Unpin>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut guard) = sink.lock() {
                    guard.extend_from_slice(&buf[..n]);
                }
            }
        }
    }
}

fn snapshot(sink: &Arc<Mutex<Vec<u8>>>) -> String {
    sink.lock()
        .map(|guard| String::from_utf8_lossy(&guard).into_owned())
        .unwrap_or_default()
}

async fn settle(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(READER_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, program: &Path, args: &[String], opts: &RunOptions) -> Result<RunOutput> {
        let command = program.to_string_lossy().into_owned();
        log::debug!("running {} {:?}", command, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &opts.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: command.clone(),
            source,
        })?;

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = child
            .stdout
            .take()
            .map(|s| tokio::spawn(drain(s, stdout_buf.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|s| tokio::spawn(drain(s, stderr_buf.clone())));

        let mut timed_out = false;
        let status = match opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    timed_out = true;
                    log::warn!("{} exceeded {}ms, killing it", command, limit.as_millis());
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        settle(stdout_task).await;
        settle(stderr_task).await;

        let stdout = snapshot(&stdout_buf);
        let mut stderr = snapshot(&stderr_buf);
        if let Some(limit) = opts.timeout.filter(|_| timed_out) {
            stderr.push_str(&format!(
                "\n[timeout] process exceeded {}ms",
                limit.as_millis()
            ));
        }

        Ok(RunOutput {
            command,
            args: args.to_vec(),
            code: status.and_then(|s| s.code()),
            stdout,
            stderr,
            timed_out,
        })
    }
}
