use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use framewatch_protocol::{DecodeError, FrameDecoder};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Sleep};
use tracing::{debug, trace, warn};

use crate::{
    Diagnostic, DiagnosticRing, ExitOutcome, MonitorConfig, MonitorError, MonitorEvent,
    MonitorEvents, ProcessExit, StreamKind,
};

/// Fields requested for every frame
pub const FRAME_ENTRIES: &str =
    "frame=pkt_size,pkt_pts_time,media_type,pict_type,key_frame,width,height";

const READ_CHUNK_SIZE: usize = 8 * 1024;

type StopReply = oneshot::Sender<ProcessExit>;
type SharedSession = Arc<Mutex<Option<SessionHandle>>>;

/// What the monitor keeps about a running session. The child itself is owned
/// by the session's driver task.
struct SessionHandle {
    pid: Option<u32>,
    /// Taken by whoever initiates the stop
    stop_tx: Option<oneshot::Sender<StopReply>>,
}

/// Argument list for continuous frame monitoring of `url`
pub fn build_args(config: &MonitorConfig, url: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        config.log_level().to_string(),
        "-fflags".to_string(),
        "nobuffer".to_string(),
        "-rw_timeout".to_string(),
        (config.timeout_ms() * 1000).to_string(),
    ];

    if let Some(analyze_ms) = config.analyze_duration_ms() {
        args.push("-analyzeduration".to_string());
        args.push((analyze_ms * 1000).to_string());
    }

    args.push("-show_frames".to_string());
    args.push("-show_entries".to_string());
    args.push(FRAME_ENTRIES.to_string());
    args.push(url.to_string());
    args
}

/// Supervises one probe process at a time for a single stream.
///
/// All session activity is reported on the event channel returned by
/// [`ProbeMonitor::new`]. Each session ends with exactly one
/// [`MonitorEvent::Exit`].
pub struct ProbeMonitor {
    url: String,
    config: MonitorConfig,
    events: mpsc::UnboundedSender<MonitorEvent>,
    session: SharedSession,
}

impl ProbeMonitor {
    pub fn new(url: impl Into<String>, config: MonitorConfig) -> (Self, MonitorEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let monitor = Self {
            url: url.into(),
            config,
            events,
            session: Arc::new(Mutex::new(None)),
        };
        (monitor, rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// True while a probe process is held
    pub fn is_listening(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.session).as_ref().and_then(|s| s.pid)
    }

    /// Start a probe session.
    ///
    /// Must be called from within a Tokio runtime. An invocation the OS
    /// rejects as malformed is returned as [`MonitorError::InvalidArgument`];
    /// any other spawn failure is reported as an `Exit` event carrying
    /// [`ExitOutcome::StartError`] and leaves the monitor idle.
    pub fn listen(&self) -> Result<(), MonitorError> {
        let mut session = lock(&self.session);
        if session.is_some() {
            return Err(MonitorError::AlreadyListening);
        }

        let args = build_args(&self.config, &self.url);
        debug!(
            probe = %self.config.probe_path().display(),
            args = ?args,
            "Spawning probe process"
        );

        let mut cmd = Command::new(self.config.probe_path());
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                return Err(MonitorError::InvalidArgument(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to start probe process");
                self.start_error(e.to_string());
                return Ok(());
            }
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.start_kill();
                self.start_error("probe output pipes were not captured".to_string());
                return Ok(());
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        *session = Some(SessionHandle {
            pid: child.id(),
            stop_tx: Some(stop_tx),
        });
        drop(session);

        let driver = SessionDriver {
            child,
            stdout,
            stderr,
            decoder: FrameDecoder::new(self.config.buffer_max_length()),
            diagnostics: DiagnosticRing::default(),
            events: self.events.clone(),
            session: self.session.clone(),
            stop_guard: self.config.stop_guard_timeout(),
        };
        tokio::spawn(driver.run(stop_rx));

        Ok(())
    }

    /// Stop the running session.
    ///
    /// Sends SIGTERM and resolves once the process has actually exited. If it
    /// is still alive after the configured guard timeout it is killed.
    pub async fn stop_listen(&self) -> Result<ProcessExit, MonitorError> {
        let stop_tx = lock(&self.session)
            .as_mut()
            .and_then(|s| s.stop_tx.take())
            .ok_or(MonitorError::AlreadyStopped)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        stop_tx
            .send(reply_tx)
            .map_err(|_| MonitorError::AlreadyStopped)?;

        reply_rx.await.map_err(|_| {
            MonitorError::StopFailed("session ended without reporting an exit status".to_string())
        })
    }

    fn start_error(&self, message: String) {
        let _ = self.events.send(MonitorEvent::Exit(ExitOutcome::StartError {
            error: MonitorError::StartFailed(message),
        }));
    }
}

/// Owns the child process for the lifetime of one session.
struct SessionDriver {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    decoder: FrameDecoder,
    diagnostics: DiagnosticRing,
    events: mpsc::UnboundedSender<MonitorEvent>,
    session: SharedSession,
    stop_guard: Duration,
}

impl SessionDriver {
    async fn run(self, mut stop_rx: oneshot::Receiver<StopReply>) {
        let SessionDriver {
            mut child,
            mut stdout,
            stderr,
            mut decoder,
            mut diagnostics,
            events,
            session,
            stop_guard,
        } = self;

        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut utf8 = Utf8Carry::default();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut stop_seen = false;
        let mut waiters: Vec<StopReply> = Vec::new();
        let mut guard: Option<Pin<Box<Sleep>>> = None;
        let mut failure: Option<DecodeError> = None;

        let status = loop {
            tokio::select! {
                biased;

                // stop handling goes first so a busy stdout cannot starve it
                request = &mut stop_rx, if !stop_seen => {
                    stop_seen = true;
                    // a dropped sender means the stop was taken over by escalation
                    if let Ok(reply) = request {
                        waiters.push(reply);
                        if let Err(e) = terminate(&mut child, &mut guard, stop_guard) {
                            warn!(error = %e, "SIGTERM failed, killing probe");
                            let _ = child.start_kill();
                        }
                    }
                },

                _ = wait_guard(&mut guard) => {
                    warn!(timeout = ?stop_guard, "Probe ignored termination, killing it");
                    guard = None;
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "Failed to kill probe");
                    }
                },

                read = stdout.read(&mut buf), if stdout_open && failure.is_none() => match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        let chunk = utf8.decode(&buf[..n]);
                        match decoder.decode(&chunk) {
                            Ok(frames) => {
                                for frame in frames {
                                    let _ = events.send(MonitorEvent::Frame(frame));
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "Frame decoding failed, stopping probe");
                                failure = Some(err);
                                if let Err(stop_err) =
                                    escalate_stop(&session, &mut child, &mut guard, stop_guard)
                                {
                                    let _ = events.send(MonitorEvent::Error(stop_err));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read probe stdout");
                        stdout_open = false;
                        let _ = events.send(MonitorEvent::Error(MonitorError::Stream {
                            stream: StreamKind::Stdout,
                            message: e.to_string(),
                        }));
                    }
                },

                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        trace!(line = %line, "stderr");
                        let diagnostic = Diagnostic::new(line);
                        diagnostics.push(diagnostic.clone());
                        let _ = events.send(MonitorEvent::Stderr(diagnostic));
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read probe stderr");
                        stderr_open = false;
                        let _ = events.send(MonitorEvent::Error(MonitorError::Stream {
                            stream: StreamKind::Stderr,
                            message: e.to_string(),
                        }));
                    }
                },

                status = child.wait() => break status,
            }
        };

        let exit = match status {
            Ok(status) => ProcessExit::from(status),
            Err(e) => {
                let _ = events.send(MonitorEvent::Error(MonitorError::Process(e.to_string())));
                ProcessExit::default()
            }
        };

        // A stop request that raced the exit still gets its answer. Later ones
        // fail with AlreadyStopped once the receiver is closed.
        if !stop_seen {
            stop_rx.close();
            if let Ok(reply) = stop_rx.try_recv() {
                waiters.push(reply);
            }
        }

        drop(stderr_lines);
        drop(stdout);
        *lock(&session) = None;

        debug!(code = ?exit.code, signal = ?exit.signal, "Probe process exited");

        for waiter in waiters {
            let _ = waiter.send(exit.clone());
        }

        let outcome = match failure {
            Some(err) => ExitOutcome::ProcessingError {
                error: MonitorError::Decode(err),
            },
            None => ExitOutcome::classify(&exit, &diagnostics),
        };
        let _ = events.send(MonitorEvent::Exit(outcome));
    }
}

/// Stop the session on the driver's own initiative, claiming the stop handle
/// exactly like an external `stop_listen` would.
fn escalate_stop(
    session: &SharedSession,
    child: &mut Child,
    guard: &mut Option<Pin<Box<Sleep>>>,
    stop_guard: Duration,
) -> Result<(), MonitorError> {
    let claimed = lock(session)
        .as_mut()
        .and_then(|s| s.stop_tx.take())
        .is_some();
    if !claimed {
        return Err(MonitorError::AlreadyStopped);
    }

    if let Err(e) = terminate(child, guard, stop_guard) {
        let _ = child.start_kill();
        return Err(e);
    }
    Ok(())
}

fn terminate(
    child: &mut Child,
    guard: &mut Option<Pin<Box<Sleep>>>,
    stop_guard: Duration,
) -> Result<(), MonitorError> {
    if guard.is_none() {
        *guard = Some(Box::pin(sleep(stop_guard)));
    }
    send_sigterm(child).map_err(|e| MonitorError::StopFailed(e.to_string()))
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

async fn wait_guard(guard: &mut Option<Pin<Box<Sleep>>>) {
    match guard {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

fn lock(session: &SharedSession) -> MutexGuard<'_, Option<SessionHandle>> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Carries an incomplete UTF-8 sequence across reads.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }
}
