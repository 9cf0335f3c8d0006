//! Session supervisor
//!
//! Runs one ffmpeg child per playlist entry, advancing when a child exits,
//! optionally wrapping back to the first entry, and terminating the live
//! child when the caller stops the session. Progress and lifecycle are
//! reported as [`SessionEvent`]s on an unbounded channel.
//!
//! State machine: `Idle -> Running(i) -> {Running(i + 1) | Running(0) | Idle}`.
//! At most one session is active per supervisor; a second `start` is
//! rejected rather than queued.

use crate::encode::{spawn_encoder, EncodingParams, LaunchError, SpawnedEncoder};
use crate::events::{event_channel, EventReceiver, EventSender, SessionEvent, NO_CHILD_EXIT_CODE};
use crate::playlist::filter_playable;
use crate::progress::parse_progress;
use crate::pump::{OutputLine, OutputPump};
use crate::resolver::resolve_encoder;
use crate::status::{new_shared_status, SessionState, SharedStatus};
use rtmp_restream_config::{Settings, SupervisorConfig};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Rejections returned by [`Supervisor::start`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("ffmpeg not found; install ffmpeg or configure its path")]
    EncoderNotFound,

    #[error("an ffmpeg session is already running")]
    AlreadyRunning,

    #[error("playlist is empty or none of its files exist")]
    EmptyPlaylist,
}

/// Coarse classification of supervisor rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing encoder or unusable playlist
    Configuration,
    /// A session is already active
    Concurrency,
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::EncoderNotFound | SupervisorError::EmptyPlaylist => {
                ErrorKind::Configuration
            }
            SupervisorError::AlreadyRunning => ErrorKind::Concurrency,
        }
    }
}

/// Shutdown timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Wait after a graceful terminate before killing the child
    pub grace_period: Duration,
    /// Bounded wait for the output readers once the child has exited
    pub reader_join_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        SupervisorConfig::default().into()
    }
}

impl From<SupervisorConfig> for SupervisorOptions {
    fn from(cfg: SupervisorConfig) -> Self {
        Self {
            grace_period: Duration::from_millis(cfg.grace_period_ms),
            reader_join_timeout: Duration::from_millis(cfg.reader_join_ms),
        }
    }
}

/// Everything one session needs; fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub entries: Vec<PathBuf>,
    pub destination: String,
    pub loop_playlist: bool,
    pub encoding: EncodingParams,
}

impl SessionConfig {
    pub fn new(entries: Vec<PathBuf>, destination: impl Into<String>, loop_playlist: bool) -> Self {
        Self {
            entries,
            destination: destination.into(),
            loop_playlist,
            encoding: EncodingParams::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingParams) -> Self {
        self.encoding = encoding;
        self
    }
}

struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveSession>>>;

fn lock_slot(slot: &Mutex<Option<ActiveSession>>) -> MutexGuard<'_, Option<ActiveSession>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Supervises restream sessions
///
/// Must be used from within a tokio runtime; `start` spawns the supervising
/// task onto the current runtime.
pub struct Supervisor {
    encoder: Option<PathBuf>,
    options: SupervisorOptions,
    events: EventSender,
    active: ActiveSlot,
    status: SharedStatus,
}

impl Supervisor {
    /// Create a supervisor and the receiver for its notifications
    ///
    /// `encoder` is the resolved ffmpeg path; `None` makes every `start`
    /// fail with [`SupervisorError::EncoderNotFound`].
    pub fn new(encoder: Option<PathBuf>, options: SupervisorOptions) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel();
        (Self::with_sender(encoder, options, tx), rx)
    }

    /// Create a supervisor publishing on an existing channel
    pub fn with_sender(
        encoder: Option<PathBuf>,
        options: SupervisorOptions,
        events: EventSender,
    ) -> Self {
        Self {
            encoder,
            options,
            events,
            active: Arc::new(Mutex::new(None)),
            status: new_shared_status(),
        }
    }

    /// Create a supervisor from settings, resolving the encoder path
    ///
    /// A resolution failure is logged and surfaces later as
    /// [`SupervisorError::EncoderNotFound`] from `start`.
    pub fn from_settings(settings: &Settings) -> (Self, EventReceiver) {
        let encoder = match resolve_encoder(settings.encoder.ffmpeg_path.as_deref()) {
            Ok(path) => {
                info!(encoder = %path.display(), "resolved ffmpeg");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "ffmpeg could not be resolved");
                None
            }
        };
        Self::new(encoder, settings.supervisor.clone().into())
    }

    pub fn encoder(&self) -> Option<&Path> {
        self.encoder.as_deref()
    }

    /// Shared status snapshot, updated by the supervising task
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// True while a session is active, including while it is stopping
    pub fn is_running(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// Start a session
    ///
    /// Checks, in order: no session active, at least one playable entry
    /// after filtering, encoder available. A rejection is also published as
    /// [`SessionEvent::Error`] and leaves any existing session untouched.
    /// On success `Started` has been published before this returns.
    pub fn start(&self, config: SessionConfig) -> Result<Uuid, SupervisorError> {
        let mut active = lock_slot(&self.active);

        if active.is_some() {
            return Err(self.reject(SupervisorError::AlreadyRunning));
        }

        let entries = filter_playable(&config.entries);
        if entries.is_empty() {
            return Err(self.reject(SupervisorError::EmptyPlaylist));
        }

        let Some(encoder) = self.encoder.clone() else {
            return Err(self.reject(SupervisorError::EncoderNotFound));
        };

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *active = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
        });

        info!(
            session = %id,
            entries = entries.len(),
            loop_playlist = config.loop_playlist,
            "session starting"
        );
        let _ = self.events.send(SessionEvent::Started);

        let runner = SessionRunner {
            id,
            entries,
            destination: config.destination,
            loop_playlist: config.loop_playlist,
            encoding: config.encoding,
            encoder,
            options: self.options,
            cancel,
            events: self.events.clone(),
            status: self.status.clone(),
        };
        tokio::spawn(supervise(runner, self.active.clone()));

        Ok(id)
    }

    /// Request the active session to stop
    ///
    /// Sets the session's cancellation flag; the supervising task then
    /// terminates the live child (if any) and stops sequencing. Safe to call
    /// repeatedly and when idle. Does not block. Returns true if a session
    /// was active.
    pub fn stop(&self) -> bool {
        match lock_slot(&self.active).as_ref() {
            Some(session) => {
                if !session.cancel.is_cancelled() {
                    info!(session = %session.id, "stop requested");
                }
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn reject(&self, err: SupervisorError) -> SupervisorError {
        warn!(error = %err, "session start rejected");
        let _ = self.events.send(SessionEvent::Error {
            message: err.to_string(),
        });
        err
    }
}

impl Drop for Supervisor {
    /// Dropping the supervisor stops its session; the supervising task
    /// still terminates the child and publishes `Stopped`.
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outer supervising task: runs the session, then releases it
///
/// The slot is cleared and status set to idle before `Stopped` is
/// published, so a caller reacting to `Stopped` can start again at once.
async fn supervise(runner: SessionRunner, active: ActiveSlot) {
    let id = runner.id;
    let events = runner.events.clone();
    let status = runner.status.clone();

    let exit_code = match tokio::spawn(runner.run()).await {
        Ok(code) => code,
        Err(e) => {
            error!(session = %id, error = %e, "supervising task failed");
            NO_CHILD_EXIT_CODE
        }
    };

    status.write().await.finish(exit_code);
    {
        let mut slot = lock_slot(&active);
        if slot.as_ref().map(|s| s.id) == Some(id) {
            *slot = None;
        }
    }

    info!(session = %id, exit_code, "session stopped");
    let _ = events.send(SessionEvent::Stopped { exit_code });
}

struct SessionRunner {
    id: Uuid,
    entries: Vec<PathBuf>,
    destination: String,
    loop_playlist: bool,
    encoding: EncodingParams,
    encoder: PathBuf,
    options: SupervisorOptions,
    cancel: CancellationToken,
    events: EventSender,
    status: SharedStatus,
}

impl SessionRunner {
    /// Sequence entries until the playlist ends or the session is cancelled
    ///
    /// Returns the exit code of the last child that ran, or
    /// [`NO_CHILD_EXIT_CODE`] if none did.
    async fn run(self) -> i32 {
        self.status
            .write()
            .await
            .begin(self.id, self.entries.clone(), self.loop_playlist);

        let mut index = 0;
        let mut exit_code = NO_CHILD_EXIT_CODE;
        let mut failed_launches = 0;

        while !self.cancel.is_cancelled() {
            let entry = &self.entries[index];

            {
                let mut status = self.status.write().await;
                status.current_index = Some(index);
                status.current_entry = Some(entry.clone());
            }
            let _ = self.events.send(SessionEvent::EntryStarted {
                path: entry.clone(),
            });

            match self.run_entry(entry).await {
                Ok(code) => {
                    exit_code = code;
                    failed_launches = 0;
                }
                Err(e) => {
                    warn!(session = %self.id, entry = %entry.display(), error = %e, "launch failed");
                    let _ = self.events.send(SessionEvent::Error {
                        message: format!("{}: {}", entry.display(), e),
                    });
                    failed_launches += 1;
                    // A full pass of failed launches ends the session, looping or not
                    if failed_launches >= self.entries.len() {
                        warn!(session = %self.id, "no entry could be launched, stopping");
                        break;
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            index += 1;
            if index >= self.entries.len() {
                if !self.loop_playlist {
                    break;
                }
                debug!(session = %self.id, "playlist finished, looping");
                index = 0;
            }
        }

        exit_code
    }

    /// Run one entry's encoder to completion or cancellation
    async fn run_entry(&self, entry: &Path) -> Result<i32, LaunchError> {
        let SpawnedEncoder {
            mut child,
            pid,
            stdout,
            stderr,
        } = spawn_encoder(&self.encoder, entry, &self.destination, &self.encoding)?;

        info!(session = %self.id, pid, entry = %entry.display(), "encoder launched");
        {
            let mut status = self.status.write().await;
            status.pid = pid;
            status.launches += 1;
        }

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let pump = OutputPump::attach(stdout, stderr, line_tx);

        let exit = loop {
            tokio::select! {
                result = child.wait() => break result,
                Some(line) = line_rx.recv() => self.forward(line).await,
                _ = self.cancel.cancelled() => {
                    self.status.write().await.state = SessionState::Stopping;
                    break self.shutdown(&mut child).await;
                }
            }
        };

        if !pump.join(self.options.reader_join_timeout).await {
            debug!(session = %self.id, "output readers aborted after encoder exit");
        }
        while let Ok(line) = line_rx.try_recv() {
            self.forward(line).await;
        }
        drop(child);

        let code = match exit {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                warn!(session = %self.id, error = %e, "failed to collect encoder exit status");
                NO_CHILD_EXIT_CODE
            }
        };
        info!(session = %self.id, exit_code = code, "encoder exited");

        {
            let mut status = self.status.write().await;
            status.pid = None;
            status.last_exit_code = Some(code);
        }
        Ok(code)
    }

    /// Publish one encoder line, then any progress parsed from it
    ///
    /// A sample with no extracted field is not published.
    async fn forward(&self, output: OutputLine) {
        let OutputLine { line, .. } = output;
        let sample = parse_progress(&line).filter(|sample| !sample.is_empty());
        let _ = self.events.send(SessionEvent::Log { line });

        if let Some(sample) = sample {
            self.status.write().await.last_progress = Some(sample.clone());
            let _ = self.events.send(SessionEvent::Progress { sample });
        }
    }

    /// Terminate the child, escalating to a kill after the grace period
    async fn shutdown(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        info!(session = %self.id, "terminating encoder");
        terminate(child);

        if let Ok(result) = tokio::time::timeout(self.options.grace_period, child.wait()).await {
            return result;
        }

        warn!(
            session = %self.id,
            grace_ms = self.options.grace_period.as_millis() as u64,
            "encoder ignored terminate, killing"
        );
        child.start_kill()?;
        match tokio::time::timeout(self.options.grace_period, child.wait()).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "encoder did not exit after kill",
            )),
        }
    }
}

/// Ask the child to exit
///
/// SIGTERM on Unix. Windows has no graceful signal for a windowless
/// console child, so the process is terminated outright.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // id() is None once the child has been reaped
        if let Some(pid) = child.id() {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "terminate failed");
        }
    }
}

/// Exit code of a finished child; signals map to their negated number
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    NO_CHILD_EXIT_CODE
}
