//! Encoder executable discovery
//!
//! Locates the ffmpeg binary in this order:
//! - an explicit path from settings or the command line
//! - a bundled `vendor/<platform>/` directory next to the executable or in
//!   the working directory
//! - every directory on `PATH`

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error types for encoder discovery
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("ffmpeg not found at {0}")]
    ExplicitPathInvalid(PathBuf),

    #[error("ffmpeg not found in vendor directories or PATH")]
    NotFound,

    #[error("ffmpeg -version failed: {0}")]
    VersionCheck(String),
}

/// Vendor subdirectory name for the current platform
pub fn platform_dir_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    }
}

/// File name of the encoder binary for the current platform
pub fn encoder_file_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// True if `path` is a regular file the current user may execute
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Candidate bundled encoder locations, in probe order, without duplicates
pub fn vendor_candidates(exe_dir: Option<&Path>, cwd: Option<&Path>) -> Vec<PathBuf> {
    let platform = platform_dir_name();
    let file = encoder_file_name();

    let mut bases = Vec::new();
    if let Some(dir) = exe_dir {
        bases.push(dir.to_path_buf());
        if let Some(parent) = dir.parent() {
            bases.push(parent.to_path_buf());
        }
    }
    if let Some(dir) = cwd {
        bases.push(dir.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for base in bases {
        let candidate = base.join("vendor").join(platform).join(file);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Search the directories of a `PATH`-style value for the encoder
pub fn search_path(path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(encoder_file_name()))
        .find(|candidate| is_executable(candidate))
}

/// Resolve the encoder executable
///
/// An explicit path must exist and be executable; it is never silently
/// replaced by another binary.
///
/// # Errors
/// - [`ResolveError::ExplicitPathInvalid`] if `explicit` is not executable
/// - [`ResolveError::NotFound`] if no candidate location holds the encoder
pub fn resolve_encoder(explicit: Option<&Path>) -> Result<PathBuf, ResolveError> {
    if let Some(path) = explicit {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(ResolveError::ExplicitPathInvalid(path.to_path_buf()))
        };
    }

    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let cwd = env::current_dir().ok();

    vendor_candidates(exe_dir.as_deref(), cwd.as_deref())
        .into_iter()
        .find(|candidate| is_executable(candidate))
        .or_else(|| search_path(env::var_os("PATH")))
        .ok_or(ResolveError::NotFound)
}

/// Parse the version token from `ffmpeg -version` output
///
/// Handles release builds (`ffmpeg version 6.1.1-3ubuntu5 ...`) and git
/// builds prefixed with `n` (`ffmpeg version n7.0-12-g...`).
pub fn parse_ffmpeg_version(version_output: &str) -> Option<String> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version = version_part
        .trim_start_matches('n')
        .split('-')
        .next()?
        .to_string();

    if version.chars().next()?.is_ascii_digit() {
        Some(version)
    } else {
        None
    }
}

/// Run `<encoder> -version` and return the parsed version
pub fn encoder_version(encoder: &Path) -> Result<String, ResolveError> {
    let output = Command::new(encoder)
        .arg("-version")
        .output()
        .map_err(|e| ResolveError::VersionCheck(e.to_string()))?;

    if !output.status.success() {
        return Err(ResolveError::VersionCheck(format!(
            "exited with {}",
            output.status
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse_ffmpeg_version(&text).ok_or_else(|| {
        ResolveError::VersionCheck(format!(
            "could not parse version from: {}",
            text.lines().next().unwrap_or("(empty)")
        ))
    })
}
