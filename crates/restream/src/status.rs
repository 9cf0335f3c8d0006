//! Session status snapshot
//!
//! A serializable view of the supervisor's state, shared between the
//! supervising task and readers such as the status endpoint.

use crate::progress::ProgressSample;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Cancellation requested, waiting for the encoder to exit
    Stopping,
}

/// Point-in-time view of the current (or last) session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub entries: Vec<PathBuf>,
    pub loop_playlist: bool,
    pub current_index: Option<usize>,
    pub current_entry: Option<PathBuf>,
    pub pid: Option<u32>,
    /// Encoders launched in this session, across loops
    pub launches: u64,
    pub last_progress: Option<ProgressSample>,
    pub last_exit_code: Option<i32>,
    pub started_at_unix_ms: i64,
}

pub type SharedStatus = Arc<RwLock<SessionStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(RwLock::new(SessionStatus::default()))
}

impl SessionStatus {
    /// Reset for a freshly started session, keeping nothing from the last one
    pub fn begin(&mut self, session_id: Uuid, entries: Vec<PathBuf>, loop_playlist: bool) {
        *self = SessionStatus {
            state: SessionState::Running,
            session_id: Some(session_id),
            entries,
            loop_playlist,
            started_at_unix_ms: unix_timestamp_ms(),
            ..SessionStatus::default()
        };
    }

    /// Mark the session finished; entries and exit code remain for inspection
    pub fn finish(&mut self, exit_code: i32) {
        self.state = SessionState::Idle;
        self.current_index = None;
        self.current_entry = None;
        self.pid = None;
        self.last_exit_code = Some(exit_code);
    }
}

pub(crate) fn unix_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
