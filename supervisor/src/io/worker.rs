//! Worker launch and supervision seam.
//!
//! The [`Worker`] trait decouples the loop from the actual agent backend
//! (`claude` in production). Tests use scripted workers that never spawn
//! processes. The real worker is launched as its own process-group leader so
//! the stall watchdog can kill the whole tree through one group signal, and
//! its output is teed to the session log while it runs.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

/// Environment variable carrying the supervising session id into the worker
/// (and from there into its instrumentation hooks).
pub const SESSION_ENV_VAR: &str = "SUPERVISOR_SESSION";

/// Trailing window of the session log kept for the completion-sentinel scan.
const LOG_TAIL_BYTES: u64 = 64 * 1024;

/// Parameters for one worker launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Working directory for the worker process.
    pub workdir: PathBuf,
    /// Instruction payload fed to the worker on stdin.
    pub instruction: String,
    /// Supervising session id, exported as [`SESSION_ENV_VAR`].
    pub session_id: String,
    /// Model selection passed through to the worker, when set.
    pub model: Option<String>,
    /// Materialized sandbox policy; present means launch under the
    /// enforcement wrapper.
    pub policy_path: Option<PathBuf>,
    /// Where worker stdout/stderr is captured.
    pub log_path: PathBuf,
}

/// How a worker process ended.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    /// Exit code; `None` when the process died to a signal.
    pub exit_status: Option<i32>,
    pub success: bool,
    /// Trailing window of captured output.
    pub log_tail: String,
}

/// A launched worker, waited on by the supervisor while the watchdog and
/// poller run alongside.
pub trait WorkerHandle {
    /// Process id (and process-group id) of the launched worker.
    fn pid(&self) -> u32;
    /// Block until the worker exits.
    fn wait(&mut self) -> Result<WorkerExit>;
}

/// Abstraction over worker backends.
pub trait Worker {
    type Handle: WorkerHandle;
    fn launch(&self, request: &LaunchRequest) -> Result<Self::Handle>;
}

/// Launches `claude` in print mode with full tool authority.
pub struct ClaudeWorker;

impl Worker for ClaudeWorker {
    type Handle = ClaudeHandle;

    fn launch(&self, request: &LaunchRequest) -> Result<ClaudeHandle> {
        info!(
            session_id = %request.session_id,
            sandboxed = request.policy_path.is_some(),
            "launching worker"
        );
        let mut cmd = match &request.policy_path {
            Some(policy) => {
                let mut cmd = Command::new(crate::io::sandbox::RUNTIME_BIN);
                cmd.arg("--settings").arg(policy).arg("--").arg("claude");
                cmd
            }
            None => Command::new("claude"),
        };
        cmd.arg("-p").arg("--dangerously-skip-permissions");
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd.env(SESSION_ENV_VAR, &request.session_id)
            .current_dir(&request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().context("spawn worker command")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("worker stdin was not piped"))?;
        stdin
            .write_all(request.instruction.as_bytes())
            .context("write instruction to worker stdin")?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("worker stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("worker stderr was not piped"))?;

        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create session log dir {}", parent.display()))?;
        }
        let log_file = File::create(&request.log_path)
            .with_context(|| format!("create session log {}", request.log_path.display()))?;
        let log_writer = Arc::new(Mutex::new(BufWriter::new(log_file)));

        let tees = vec![
            tee_stream(stdout, log_writer.clone()),
            tee_stream(stderr, log_writer),
        ];

        debug!(pid = child.id(), "worker spawned");
        Ok(ClaudeHandle {
            child,
            log_path: request.log_path.clone(),
            tees,
        })
    }
}

/// Handle to a running `claude` process.
pub struct ClaudeHandle {
    child: Child,
    log_path: PathBuf,
    tees: Vec<JoinHandle<()>>,
}

impl WorkerHandle for ClaudeHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn wait(&mut self) -> Result<WorkerExit> {
        let status = self.child.wait().context("wait for worker")?;
        for tee in self.tees.drain(..) {
            let _ = tee.join();
        }
        let log_tail = read_log_tail(&self.log_path)?;
        debug!(exit_code = ?status.code(), "worker finished");
        Ok(WorkerExit {
            exit_status: status.code(),
            success: status.success(),
            log_tail,
        })
    }
}

/// Copy a stream to the shared log writer line by line, flushing per line so
/// the log is observable while the worker runs.
fn tee_stream<R: Read + Send + 'static>(
    reader: R,
    writer: Arc<Mutex<BufWriter<File>>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf_reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match buf_reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if let Ok(mut writer) = writer.lock() {
                        if let Err(err) = writer.write_all(&line) {
                            warn!(err = %err, "failed to write session log");
                        } else if let Err(err) = writer.flush() {
                            warn!(err = %err, "failed to flush session log");
                        }
                    }
                }
                Err(err) => {
                    warn!(err = %err, "failed to read worker output");
                    break;
                }
            }
        }
    })
}

/// Trailing window of the session log. A missing log reads as empty.
pub fn read_log_tail(path: &Path) -> Result<String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(String::new()),
    };
    let len = file
        .metadata()
        .with_context(|| format!("stat session log {}", path.display()))?
        .len();
    file.seek(SeekFrom::Start(len.saturating_sub(LOG_TAIL_BYTES)))
        .with_context(|| format!("seek session log {}", path.display()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("read session log {}", path.display()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
