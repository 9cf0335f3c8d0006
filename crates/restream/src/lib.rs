//! RTMP Restream
//!
//! Supervises ffmpeg to push a playlist of local media files to an RTMP/RTMPS
//! destination, one encoder process per entry, with cooperative cancellation
//! and a live event feed.

pub mod encode;
pub mod events;
pub mod playlist;
pub mod progress;
pub mod pump;
pub mod resolver;
pub mod status;
pub mod status_server;
pub mod supervisor;
pub mod validate;

pub use rtmp_restream_config as config;
pub use rtmp_restream_config::Settings;
pub use encode::{build_ffmpeg_command, spawn_encoder, EncodingParams, LaunchError};
pub use events::{event_channel, EventReceiver, EventSender, SessionEvent, NO_CHILD_EXIT_CODE};
pub use playlist::{filter_playable, load_playlist, save_playlist, scan_media_dirs, PlaylistError};
pub use progress::{parse_progress, ProgressSample};
pub use resolver::{encoder_version, resolve_encoder, ResolveError};
pub use status::{new_shared_status, SessionState, SessionStatus, SharedStatus};
pub use status_server::{create_status_router, run_status_server, ServerError, DEFAULT_STATUS_ADDR};
pub use supervisor::{
    ErrorKind, SessionConfig, Supervisor, SupervisorError, SupervisorOptions,
};
pub use validate::{is_file_readable, is_valid_destination};
