//! Notifications delivered from a session to its caller

use crate::progress::ProgressSample;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Exit code reported when no encoder ever ran in a session
pub const NO_CHILD_EXIT_CODE: i32 = -1;

/// One notification from the session supervisor
///
/// Within a session the order is: `Started`, then per entry `EntryStarted`
/// followed by that entry's `Log`/`Progress` events, and finally exactly one
/// `Stopped`. `Error` may appear before `Started` (rejected start) or between
/// entries (launch failure).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The first encoder is about to launch
    Started,
    /// A playlist entry is about to launch
    EntryStarted { path: PathBuf },
    /// One raw diagnostic line from the active encoder
    Log { line: String },
    /// Progress parsed from the preceding `Log` line
    Progress { sample: ProgressSample },
    /// Sequencing ended; carries the final child's exit code
    Stopped { exit_code: i32 },
    /// Validation, concurrency or launch failure
    Error { message: String },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the channel a supervisor publishes its notifications on
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
