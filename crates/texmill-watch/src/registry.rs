use crate::ring::LogRing;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use texmill_build::strategy::LATEXMK;
use texmill_build::{CompileRequest, PreparedRequest};
use texmill_core::config::DEFAULT_WATCH_BUFFER_LINES;
use texmill_core::toolchain::{ToolResolver, WhichResolver};
use texmill_core::{paths, Config, Error, Result, WorkspacePolicy};
use texmill_log::Diagnostic;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Lines returned by [`WatchRegistry::tail`] when no count is given.
pub const DEFAULT_TAIL_LINES: usize = 200;

/// How long output may keep arriving after the watched process exited.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Snapshot of a session's metadata. Buffered output is not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchInfo {
    pub id: String,
    pub pid: Option<u32>,
    pub command: String,
    pub args: Vec<String>,
    pub root: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub started_at: u64,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_warnings: Vec<Diagnostic>,
}

#[derive(Debug)]
struct WatchSession {
    info: WatchInfo,
    running: AtomicBool,
    buffer: Mutex<LogRing>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl WatchSession {
    fn snapshot(&self) -> WatchInfo {
        WatchInfo {
            running: self.running.load(Ordering::SeqCst),
            ..self.info.clone()
        }
    }

    fn push_line(&self, line: &str) {
        if let Ok(mut ring) = self.buffer.lock() {
            ring.push(line);
        }
    }
}

/// The live watch sessions of one process.
///
/// Every method takes `&self`; the registry can be shared behind an `Arc`
/// and used from concurrent tasks. Spawning requires a Tokio runtime.
#[derive(Debug)]
pub struct WatchRegistry {
    sessions: DashMap<String, Arc<WatchSession>>,
    resolver: Arc<dyn ToolResolver>,
    policy: WorkspacePolicy,
    buffer_lines: usize,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new(
            Arc::new(WhichResolver),
            WorkspacePolicy::unrestricted(),
            DEFAULT_WATCH_BUFFER_LINES,
        )
    }
}

impl WatchRegistry {
    pub fn new(
        resolver: Arc<dyn ToolResolver>,
        policy: WorkspacePolicy,
        buffer_lines: usize,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            policy,
            buffer_lines,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(WhichResolver), config.policy(), config.watch_buffer_lines)
    }

    /// Starts `latexmk -pvc` for the request's root document.
    ///
    /// # Errors
    ///
    /// [`Error::OutsideWorkspace`] for paths outside the workspace and
    /// [`Error::Spawn`] if latexmk cannot be started.
    pub fn start(&self, req: &CompileRequest) -> Result<WatchInfo> {
        let prepared = PreparedRequest::new(req, &self.policy)?;
        let latexmk = self.resolver.resolve_or_name(LATEXMK);
        let args = prepared.watch_args();
        let PreparedRequest { request, warnings } = prepared;
        let cwd = paths::parent_dir(&request.root);
        self.spawn_session(&latexmk, args, &request.root, Some(&cwd), warnings)
    }

    /// Supervises an arbitrary long-running program as a watch session.
    ///
    /// Both output streams are read line by line into the session's ring
    /// buffer. The session stays registered after the program exits, with
    /// `running` false, until [`stop`](Self::stop) is called.
    pub fn spawn(
        &self,
        program: &Path,
        args: Vec<String>,
        root: &Path,
        cwd: Option<&Path>,
    ) -> Result<WatchInfo> {
        self.spawn_session(program, args, root, cwd, Vec::new())
    }

    fn spawn_session(
        &self,
        program: &Path,
        args: Vec<String>,
        root: &Path,
        cwd: Option<&Path>,
        policy_warnings: Vec<Diagnostic>,
    ) -> Result<WatchInfo> {
        let command = program.to_string_lossy().into_owned();
        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: command.clone(),
            source,
        })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let session = Arc::new(WatchSession {
            info: WatchInfo {
                id: uuid::Uuid::new_v4().to_string(),
                pid: child.id(),
                command,
                args,
                root: root.to_path_buf(),
                started_at: now_millis(),
                running: true,
                policy_warnings,
            },
            running: AtomicBool::new(true),
            buffer: Mutex::new(LogRing::new(self.buffer_lines)),
            kill: Mutex::new(Some(kill_tx)),
        });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, session.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, session.clone())));
        }
        tokio::spawn(supervise(child, kill_rx, readers, session.clone()));

        let info = session.snapshot();
        log::info!("watch {} started: {} {}", info.id, info.command, info.args.join(" "));
        self.sessions.insert(info.id.clone(), session);
        Ok(info)
    }

    /// Signals the session's process and forgets the session.
    ///
    /// Returns `false` only when `id` is not registered. A session whose
    /// process already exited is still removed.
    pub fn stop(&self, id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.running.store(false, Ordering::SeqCst);
        let sender = session.kill.lock().ok().and_then(|mut k| k.take());
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
        log::info!("watch {} stopped", id);
        true
    }

    pub fn list(&self) -> Vec<WatchInfo> {
        let mut all: Vec<WatchInfo> = self.sessions.iter().map(|s| s.value().snapshot()).collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// The last `max_lines` buffered lines (default [`DEFAULT_TAIL_LINES`]).
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSession`] if no session has this id.
    pub fn tail(&self, id: &str, max_lines: Option<usize>) -> Result<Vec<String>> {
        let session = self.session(id)?;
        let ring = session
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(ring.tail(max_lines.unwrap_or(DEFAULT_TAIL_LINES)))
    }

    /// Lines buffered since `cursor`, for followers that poll.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSession`] if no session has this id.
    pub fn read_since(&self, id: &str, cursor: u64) -> Result<(Vec<String>, u64)> {
        let session = self.session(id)?;
        let ring = session
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(ring.since(cursor))
    }

    pub fn is_running(&self, id: &str) -> Option<bool> {
        self.sessions
            .get(id)
            .map(|s| s.running.load(Ordering::SeqCst))
    }

    fn session(&self, id: &str) -> Result<Arc<WatchSession>> {
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::UnknownSession(id.to_string()))
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            self.stop(&id);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

async fn pump<R: AsyncRead + Unpin>(reader: R, session: Arc<WatchSession>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => session.push_line(&String::from_utf8_lossy(&buf)),
            Err(e) => {
                log::debug!("watch {} output closed: {}", session.info.id, e);
                break;
            }
        }
    }
}

/// Waits for the process to exit or be killed, then for its output to be
/// fully buffered, and only then marks the session as not running.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    session: Arc<WatchSession>,
) {
    // A dropped sender means the session is gone, which also ends it.
    let kill = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => log::info!("watch {} exited with {}", session.info.id, status),
                Err(e) => log::warn!("watch {} could not be awaited: {}", session.info.id, e),
            }
            false
        }
        _ = kill_rx => true,
    };
    if kill {
        if let Err(e) = child.kill().await {
            log::debug!("watch {} kill failed: {}", session.info.id, e);
        }
    }
    for reader in readers {
        // Grandchildren may keep the pipes open after the process is gone.
        match tokio::time::timeout(READER_GRACE, reader).await {
            Ok(Err(e)) => log::debug!("watch {} reader failed: {}", session.info.id, e),
            Ok(Ok(())) => {}
            Err(_) => log::debug!("watch {} output still open after exit", session.info.id),
        }
    }
    session.running.store(false, Ordering::SeqCst);
}
