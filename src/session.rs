//! Worker session: owns the child process handle and its pipes, and
//! runs the dedicated reader loop that turns the merged output stream
//! into [`SessionEvent`]s.
//!
//! Process creation is an injected capability ([`Spawn`]) so the
//! session and supervisor can be exercised against scripted fakes; the
//! real [`SystemSpawner`] forces UTF-8, unbuffered worker I/O and
//! merges stderr into stdout the way the worker protocol expects.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::Clock;
use crate::codec::LineCodec;
use crate::dispatch::SessionEvent;
use crate::error::{WxError, WxResult};
use crate::model::WorkerCommand;
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome};

/// Pause between retries when a read fails or the exit code is pending.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long the reader waits for an exit code after output EOF.
const EXIT_CODE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Everything needed to launch one worker.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub interpreter: PathBuf,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    /// Spec for running `script` under `interpreter`, with the working
    /// directory set to the script's own directory and UTF-8 I/O forced
    /// (invalid byte sequences are replaced, never raised, and output
    /// is unbuffered so the line stream arrives live).
    #[must_use]
    pub fn for_script(interpreter: PathBuf, script: PathBuf) -> Self {
        let working_dir = script
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            interpreter,
            script,
            working_dir,
            env: vec![
                ("PYTHONIOENCODING".to_owned(), "utf-8".to_owned()),
                ("PYTHONUNBUFFERED".to_owned(), "1".to_owned()),
            ],
        }
    }
}

/// Liveness and signalling for one spawned worker process.
pub trait ProcessControl: Send {
    /// Non-blocking liveness check; `Some(code)` once exited. Signal
    /// deaths without a code report `-1`.
    fn poll(&mut self) -> Option<i32>;

    /// Deliver the polite termination signal.
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Force-kill the process.
    fn kill(&mut self) -> std::io::Result<()>;
}

/// A freshly spawned worker: its stdin, merged stdout+stderr, and the
/// control handle.
pub struct SpawnedWorker {
    pub stdin: Box<dyn Write + Send>,
    pub output: Box<dyn Read + Send>,
    pub control: Box<dyn ProcessControl>,
}

/// Process-creation capability.
pub trait Spawn {
    fn spawn(&self, spec: &SpawnSpec) -> WxResult<SpawnedWorker>;
}

// ---------------------------------------------------------------------------
// Real spawner
// ---------------------------------------------------------------------------

/// Spawns the worker via [`std::process::Command`], with stderr merged
/// into the stdout pipe so the reader loop sees one ordered stream.
pub struct SystemSpawner;

impl Spawn for SystemSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> WxResult<SpawnedWorker> {
        let (output, writer) = std::io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut child = Command::new(&spec.interpreter)
            .arg(&spec.script)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer))
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin piped");
        tracing::info!(
            pid = child.id(),
            script = %spec.script.display(),
            "worker spawned"
        );

        Ok(SpawnedWorker {
            stdin: Box::new(stdin),
            output: Box::new(output),
            control: Box::new(ChildControl { child }),
        })
    }
}

struct ChildControl {
    child: Child,
}

impl ProcessControl for ChildControl {
    fn poll(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            Ok(None) => None,
            // The handle is unusable; presume the process is gone.
            Err(_) => Some(-1),
        }
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        send_terminate(self.child.id())
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill exited with {status}")))
    }
}

#[cfg(windows)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "taskkill exited with {status}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Script discovery
// ---------------------------------------------------------------------------

/// Probe conventional locations for `whisperx_runner.py` and return the
/// first hit.
#[must_use]
pub fn find_worker_script() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("whisperx_runner.py"));
    }
    if let Some(home) = dirs::home_dir() {
        for dir in ["", "Downloads", "Documents", "Projects"] {
            candidates.push(home.join(dir).join("whisperx_runner.py"));
        }
    }
    candidates.into_iter().find(|path| path.exists())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// One supervised lifetime of a single worker process.
pub struct WorkerSession {
    stdin: Option<Box<dyn Write + Send>>,
    control: Arc<Mutex<Box<dyn ProcessControl>>>,
    lifecycle: Lifecycle,
    exit_code: Option<i32>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSession")
            .field("stdin", &self.stdin.is_some())
            .field("lifecycle", &self.lifecycle)
            .field("exit_code", &self.exit_code)
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

impl WorkerSession {
    /// Validate the spec, spawn the worker, and start the reader loop.
    pub fn start(
        spawner: &dyn Spawn,
        spec: &SpawnSpec,
        events: SyncSender<SessionEvent>,
    ) -> WxResult<Self> {
        if !spec.script.exists() {
            return Err(WxError::ScriptNotFound(spec.script.clone()));
        }
        if which::which(&spec.interpreter).is_err() {
            return Err(WxError::InterpreterMissing {
                interpreter: spec.interpreter.display().to_string(),
            });
        }

        let worker = spawner.spawn(spec)?;
        let control = Arc::new(Mutex::new(worker.control));
        let reader_control = Arc::clone(&control);
        let output = worker.output;
        let reader = thread::Builder::new()
            .name("worker-reader".to_owned())
            .spawn(move || reader_loop(output, &reader_control, &events))?;

        Ok(Self {
            stdin: Some(worker.stdin),
            control,
            lifecycle: Lifecycle::Running,
            exit_code: None,
            reader: Some(reader),
        })
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Write one command line to the worker and flush immediately.
    ///
    /// A closed pipe or an exited process reports [`WxError::BrokenPipe`];
    /// the caller treats the session as dead and runs cleanup, it never
    /// retries.
    pub fn send(&mut self, command: &WorkerCommand) -> WxResult<()> {
        if self.lifecycle != Lifecycle::Running {
            return Err(WxError::BrokenPipe("session is not running".to_owned()));
        }
        if let Some(code) = self.poll() {
            return Err(WxError::BrokenPipe(format!(
                "worker exited with code {code}"
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(WxError::BrokenPipe("worker stdin already closed".to_owned()));
        };
        let line = command.wire_form();
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|error| WxError::BrokenPipe(error.to_string()))?;
        tracing::debug!(command = line.trim_end(), "command sent");
        Ok(())
    }

    /// Non-blocking liveness check.
    pub fn poll(&mut self) -> Option<i32> {
        if let Some(code) = self.exit_code {
            return Some(code);
        }
        let code = self.control.lock().expect("lock poisoned").poll();
        if code.is_some() {
            self.exit_code = code;
        }
        code
    }

    /// Record an exit observed by the reader loop so a later `stop`
    /// skips the escalation ladder.
    pub fn mark_exited(&mut self, exit_code: Option<i32>) {
        self.exit_code = exit_code.or(self.exit_code);
        self.lifecycle = Lifecycle::Stopped;
        self.stdin = None;
    }

    /// Stop the worker through the escalation ladder. Idempotent: a
    /// stopped session reports [`ShutdownOutcome::AlreadyExited`].
    pub fn stop(
        &mut self,
        coordinator: &ShutdownCoordinator,
        clock: &dyn Clock,
    ) -> (ShutdownOutcome, Option<i32>) {
        if self.lifecycle == Lifecycle::Stopped {
            return (ShutdownOutcome::AlreadyExited, self.exit_code);
        }
        self.lifecycle = Lifecycle::Stopping;
        let stdin = self.stdin.take();
        let (outcome, code) = {
            let mut control = self.control.lock().expect("lock poisoned");
            coordinator.run(stdin, control.as_mut(), clock)
        };
        if code.is_some() {
            self.exit_code = code;
        }
        self.lifecycle = Lifecycle::Stopped;
        // The reader loop ends on its own once the pipes close; a worker
        // that survived even the kill tier would leave it blocked, so the
        // handle is dropped rather than joined.
        drop(self.reader.take());
        (outcome, self.exit_code)
    }
}

// ---------------------------------------------------------------------------
// Reader loop
// ---------------------------------------------------------------------------

/// Pull raw lines off the merged output stream, decode them, and
/// forward every event in order. Read failures degrade to a diagnostic
/// event plus a brief backoff; the loop only ends on EOF, process exit,
/// or a hung-up consumer.
fn reader_loop(
    output: Box<dyn Read + Send>,
    control: &Arc<Mutex<Box<dyn ProcessControl>>>,
    events: &SyncSender<SessionEvent>,
) {
    let mut reader = BufReader::new(output);
    let mut codec = LineCodec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                let code = await_exit_code(control);
                tracing::debug!(?code, "worker output closed");
                let _ = events.send(SessionEvent::Exited(code));
                return;
            }
            Ok(_) => {
                for event in codec.decode_bytes(&buf) {
                    if events.send(SessionEvent::Line(event)).is_err() {
                        // Consumer is gone; nothing left to report to.
                        return;
                    }
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => {
                let _ = events.send(SessionEvent::ReadFailed(error.to_string()));
                if let Some(code) = control.lock().expect("lock poisoned").poll() {
                    let _ = events.send(SessionEvent::Exited(Some(code)));
                    return;
                }
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
}

/// After EOF the exit code can lag the pipe closure; poll briefly.
fn await_exit_code(control: &Arc<Mutex<Box<dyn ProcessControl>>>) -> Option<i32> {
    let attempts = EXIT_CODE_GRACE.as_millis() / READ_RETRY_DELAY.as_millis();
    for _ in 0..attempts {
        if let Some(code) = control.lock().expect("lock poisoned").poll() {
            return Some(code);
        }
        thread::sleep(READ_RETRY_DELAY);
    }
    None
}
