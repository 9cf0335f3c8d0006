//! Input checks used by the presentation layer before starting a session.
//!
//! The supervisor itself does not validate destinations.

use std::path::Path;
use url::Url;

/// Schemes accepted for a streaming destination
pub const DESTINATION_SCHEMES: &[&str] = &["rtmp", "rtmps"];

/// True iff `url` parses as an `rtmp://` or `rtmps://` URL with a host.
///
/// Malformed authorities (spaces in the host, non-numeric or out of range
/// ports) fail to parse and are rejected.
pub fn is_valid_destination(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };

    DESTINATION_SCHEMES.contains(&parsed.scheme())
        && parsed.host_str().is_some_and(|host| !host.is_empty())
}

/// True if `path` names a regular file that can be opened for reading.
pub fn is_file_readable(path: &Path) -> bool {
    crate::playlist::is_playable(path)
}
