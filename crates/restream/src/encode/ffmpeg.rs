//! ffmpeg launcher for the restream supervisor
//!
//! Builds the fixed ffmpeg argument vector for one playlist entry and spawns
//! the encoder with its standard streams redirected.

use rtmp_restream_config::EncodingConfig;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdout};

/// Hide the console window of the child on Windows
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Error type for encoder launches
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The OS refused to start the encoder
    #[error("failed to start ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),

    /// A redirected stream was not captured
    #[error("ffmpeg {0} was not captured")]
    MissingPipe(&'static str),
}

/// Encoding parameters applied to every entry of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParams {
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
}

impl Default for EncodingParams {
    fn default() -> Self {
        EncodingConfig::default().into()
    }
}

impl From<EncodingConfig> for EncodingParams {
    fn from(cfg: EncodingConfig) -> Self {
        Self {
            video_bitrate_kbps: cfg.video_bitrate_kbps,
            audio_bitrate_kbps: cfg.audio_bitrate_kbps,
            audio_sample_rate: cfg.audio_sample_rate,
        }
    }
}

/// A running encoder with its output streams detached for the output pump
pub struct SpawnedEncoder {
    pub child: Child,
    /// OS process ID, if the child had not already been reaped
    pub pid: Option<u32>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Build the ffmpeg command for one playlist entry
///
/// The argument order is fixed:
/// `-hide_banner -re -i <input> -c:v libx264 -preset veryfast -b:v <v>k
///  -c:a aac -ar <rate> -b:a <a>k -f flv <destination>`
pub fn build_ffmpeg_command(
    encoder: &Path,
    input: &Path,
    destination: &str,
    params: &EncodingParams,
) -> Command {
    let mut cmd = Command::new(encoder);

    cmd.arg("-hide_banner");
    // Read input at its native frame rate
    cmd.arg("-re");
    cmd.arg("-i").arg(input);

    cmd.arg("-c:v").arg("libx264");
    cmd.arg("-preset").arg("veryfast");
    cmd.arg("-b:v").arg(format!("{}k", params.video_bitrate_kbps));

    cmd.arg("-c:a").arg("aac");
    cmd.arg("-ar").arg(params.audio_sample_rate.to_string());
    cmd.arg("-b:a").arg(format!("{}k", params.audio_bitrate_kbps));

    cmd.arg("-f").arg("flv");
    cmd.arg(destination);

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

/// Spawn the encoder for one playlist entry
///
/// The child is killed if its handle is dropped, so no encoder outlives the
/// session that owns it.
///
/// # Errors
/// Returns [`LaunchError::Spawn`] with the OS error if the process cannot be
/// started.
pub fn spawn_encoder(
    encoder: &Path,
    input: &Path,
    destination: &str,
    params: &EncodingParams,
) -> Result<SpawnedEncoder, LaunchError> {
    let mut cmd = tokio::process::Command::from(build_ffmpeg_command(
        encoder,
        input,
        destination,
        params,
    ));
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or(LaunchError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(LaunchError::MissingPipe("stderr"))?;

    Ok(SpawnedEncoder {
        child,
        pid,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;

    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9_/. -]{1,50}")
            .unwrap()
            .prop_filter("non-blank path", |s| !s.trim().is_empty())
    }

    #[test]
    fn test_default_params_match_stream_settings_defaults() {
        let cmd = build_ffmpeg_command(
            Path::new("/usr/bin/ffmpeg"),
            Path::new("/media/clip.mp4"),
            "rtmp://live.example.com/app/key",
            &EncodingParams::default(),
        );

        assert_eq!(cmd.get_program(), OsStr::new("/usr/bin/ffmpeg"));
        assert_eq!(
            get_command_args(&cmd),
            vec![
                "-hide_banner",
                "-re",
                "-i",
                "/media/clip.mp4",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-b:v",
                "2500k",
                "-c:a",
                "aac",
                "-ar",
                "44100",
                "-b:a",
                "128k",
                "-f",
                "flv",
                "rtmp://live.example.com/app/key",
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_command_layout_is_fixed(
            input in path_strategy(),
            key in "[a-zA-Z0-9]{1,24}",
            video in 1u32..50_000,
            audio in 1u32..1024,
            rate in 8000u32..192_000,
        ) {
            let destination = format!("rtmp://host/app/{}", key);
            let params = EncodingParams {
                video_bitrate_kbps: video,
                audio_bitrate_kbps: audio,
                audio_sample_rate: rate,
            };
            let cmd = build_ffmpeg_command(Path::new("ffmpeg"), Path::new(&input), &destination, &params);
            let args = get_command_args(&cmd);

            prop_assert_eq!(args.len(), 19);
            prop_assert_eq!(&args[0], "-hide_banner");
            prop_assert_eq!(&args[1], "-re");
            prop_assert_eq!(&args[2], "-i");
            prop_assert_eq!(&args[3], &input);
            prop_assert_eq!(&args[9], &format!("{}k", video));
            prop_assert_eq!(&args[13], &rate.to_string());
            prop_assert_eq!(&args[15], &format!("{}k", audio));
            prop_assert_eq!(&args[16], "-f");
            prop_assert_eq!(&args[17], "flv");
            // Destination is always the final argument
            prop_assert_eq!(args.last(), Some(&destination));
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_encoder_is_launch_error() {
        let result = spawn_encoder(
            Path::new("/nonexistent/encoder_12345"),
            Path::new("/media/clip.mp4"),
            "rtmp://localhost/live",
            &EncodingParams::default(),
        );

        match result {
            Err(LaunchError::Spawn(e)) => assert!(!e.to_string().is_empty()),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("spawning a missing executable should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_captures_both_streams() {
        use tokio::io::AsyncReadExt;

        // `echo` ignores the ffmpeg flags and prints them back
        let mut spawned = spawn_encoder(
            Path::new("echo"),
            Path::new("/media/clip.mp4"),
            "rtmp://localhost/live",
            &EncodingParams::default(),
        )
        .expect("echo should spawn");

        assert!(spawned.pid.is_some());

        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).await.unwrap();
        let status = spawned.child.wait().await.unwrap();

        assert!(status.success());
        assert!(out.contains("-hide_banner -re -i /media/clip.mp4"));
        assert!(out.trim_end().ends_with("rtmp://localhost/live"));
    }
}
