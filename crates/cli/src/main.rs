//! CLI entry point for RTMP Restream
//!
//! Builds a playlist from arguments and settings, starts one supervised
//! session and prints its events until it stops.

use clap::Parser;
use rtmp_restream::config::{default_playlist_path, default_settings_path};
use rtmp_restream::{
    encoder_version, is_file_readable, is_valid_destination, load_playlist, run_status_server,
    save_playlist, scan_media_dirs, SessionConfig, SessionEvent, Settings, Supervisor,
    DEFAULT_STATUS_ADDR,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// RTMP Restream - push local media files to an RTMP server through ffmpeg
#[derive(Parser, Debug)]
#[command(name = "rtmp-restream")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media files to stream, in order
    files: Vec<PathBuf>,

    /// Path to the settings file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination URL (rtmp:// or rtmps://)
    #[arg(short, long)]
    url: Option<String>,

    /// Start over from the first file after the last one finishes
    #[arg(short = 'l', long = "loop")]
    loop_playlist: bool,

    /// Add media files found recursively in this directory
    #[arg(short, long = "dir")]
    dirs: Vec<PathBuf>,

    /// Load files from a saved playlist (JSON); without a value, the default playlist file
    #[arg(short, long, num_args = 0..=1)]
    playlist: Option<Option<PathBuf>>,

    /// Save the assembled playlist (JSON) before streaming; without a value, the default playlist file
    #[arg(long, num_args = 0..=1)]
    save_playlist: Option<Option<PathBuf>>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_settings: bool,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Video bitrate in kbps
    #[arg(long)]
    video_bitrate: Option<u32>,

    /// Audio bitrate in kbps
    #[arg(long)]
    audio_bitrate: Option<u32>,

    /// Audio sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Serve the session status as JSON; without a value, on 127.0.0.1:7879
    #[arg(long, num_args = 0..=1)]
    status_addr: Option<Option<SocketAddr>>,
}

impl Args {
    /// Command line values take precedence over settings
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(path) = &self.ffmpeg {
            settings.encoder.ffmpeg_path = Some(path.clone());
        }
        if let Some(kbps) = self.video_bitrate {
            settings.encoding.video_bitrate_kbps = kbps;
        }
        if let Some(kbps) = self.audio_bitrate {
            settings.encoding.audio_bitrate_kbps = kbps;
        }
        if let Some(rate) = self.sample_rate {
            settings.encoding.audio_sample_rate = rate;
        }
        if self.loop_playlist {
            settings.playlist.loop_playlist = true;
        }
        if let Some(url) = &self.url {
            settings.stream.destination = Some(url.clone());
        }
    }

    fn playlist_path(&self) -> Option<PathBuf> {
        self.playlist
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(default_playlist_path))
    }

    fn save_playlist_path(&self) -> Option<PathBuf> {
        self.save_playlist
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(default_playlist_path))
    }

    fn status_addr(&self) -> Option<SocketAddr> {
        self.status_addr
            .map(|addr| addr.unwrap_or_else(|| SocketAddr::from(DEFAULT_STATUS_ADDR)))
    }

    /// Explicit files, then scanned directories, then a saved playlist;
    /// falls back to the settings playlist when none were given
    fn collect_entries(&self, settings: &Settings) -> Vec<PathBuf> {
        let mut entries = self.files.clone();
        entries.extend(scan_media_dirs(&self.dirs));
        if let Some(path) = self.playlist_path() {
            entries.extend(load_playlist(&path));
        }

        let explicit = !self.files.is_empty() || !self.dirs.is_empty() || self.playlist.is_some();
        if explicit {
            entries
        } else {
            settings.playlist.files.clone()
        }
    }
}

/// What a Ctrl-C press should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Ask the session to stop and wait for `Stopped`
    Stop,
    /// Stop waiting; exiting drops the encoder, which kills it
    Exit,
}

#[derive(Debug, Default)]
struct InterruptState {
    stop_requested: bool,
}

impl InterruptState {
    fn press(&mut self) -> Interrupt {
        if self.stop_requested {
            Interrupt::Exit
        } else {
            self.stop_requested = true;
            Interrupt::Stop
        }
    }
}

/// Print one event the way the log pane shows it; returns the exit code on `Stopped`
fn print_event(event: SessionEvent) -> Option<i32> {
    match event {
        SessionEvent::Started => println!("[app] Stream started."),
        SessionEvent::EntryStarted { path } => println!("[app] Now playing: {}", path.display()),
        SessionEvent::Log { line } => println!("{}", line),
        SessionEvent::Progress { .. } => {}
        SessionEvent::Error { message } => eprintln!("[error] {}", message),
        SessionEvent::Stopped { exit_code } => {
            println!("[app] Stream stopped (exit code {}).", exit_code);
            return Some(exit_code);
        }
    }
    None
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = match Settings::load_or_default(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("[error] Failed to load settings from {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    args.apply_to(&mut settings);

    if args.save_settings {
        match settings.save(&config_path) {
            Ok(()) => println!("[app] Settings saved to {}", config_path.display()),
            Err(e) => eprintln!("[error] Failed to save settings: {}", e),
        }
    }

    let entries = args.collect_entries(&settings);
    if let Some(path) = args.save_playlist_path() {
        match save_playlist(&path, &entries) {
            Ok(()) => println!("[app] Playlist saved to {}", path.display()),
            Err(e) => eprintln!("[error] {}", e),
        }
    }

    let destination = settings.stream.destination.clone().unwrap_or_default();
    if !is_valid_destination(&destination) {
        eprintln!("[error] Invalid RTMP URL. Must start with rtmp:// or rtmps://");
        return ExitCode::FAILURE;
    }
    if entries.is_empty() {
        eprintln!("[error] Playlist is empty.");
        return ExitCode::FAILURE;
    }
    for entry in entries.iter().filter(|entry| !is_file_readable(entry)) {
        println!("[app] Skipping missing file: {}", entry.display());
    }

    let (supervisor, mut events) = Supervisor::from_settings(&settings);
    if let Some(encoder) = supervisor.encoder() {
        match encoder_version(encoder) {
            Ok(version) => tracing::info!(encoder = %encoder.display(), %version, "using ffmpeg"),
            Err(e) => tracing::warn!(encoder = %encoder.display(), error = %e, "ffmpeg version check failed"),
        }
    }

    if let Some(addr) = args.status_addr() {
        let status = supervisor.status();
        tokio::spawn(async move {
            if let Err(e) = run_status_server(status, addr).await {
                tracing::error!(error = %e, "status endpoint stopped");
            }
        });
    }

    let session = SessionConfig::new(entries, destination, settings.playlist.loop_playlist)
        .with_encoding(settings.encoding.clone().into());
    if let Err(e) = supervisor.start(session) {
        eprintln!("[error] {}", e);
        return ExitCode::FAILURE;
    }

    let mut interrupts = InterruptState::default();
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let exit_code = loop {
        tokio::select! {
            _ = &mut ctrl_c => match interrupts.press() {
                Interrupt::Stop => {
                    println!("[app] Stopping stream... (Ctrl-C again to exit now)");
                    supervisor.stop();
                    ctrl_c.set(tokio::signal::ctrl_c());
                }
                Interrupt::Exit => {
                    eprintln!("[app] Exiting without waiting for ffmpeg.");
                    return ExitCode::FAILURE;
                }
            },
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(code) = print_event(event) {
                        break code;
                    }
                }
                None => break rtmp_restream::NO_CHILD_EXIT_CODE,
            },
        }
    };

    // A stream stopped on request ends normally even though ffmpeg was signalled
    if exit_code == 0 || interrupts.stop_requested {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from([
            "rtmp-restream",
            "--url",
            "rtmp://example.com/live",
            "--loop",
            "--video-bitrate",
            "4000",
            "--sample-rate",
            "48000",
            "a.mp4",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.stream.destination.as_deref(), Some("rtmp://example.com/live"));
        assert!(settings.playlist.loop_playlist);
        assert_eq!(settings.encoding.video_bitrate_kbps, 4000);
        assert_eq!(settings.encoding.audio_bitrate_kbps, 128);
        assert_eq!(settings.encoding.audio_sample_rate, 48000);
    }

    #[test]
    fn test_entries_fall_back_to_settings_playlist() {
        let mut settings = Settings::default();
        settings.playlist.files = vec![PathBuf::from("/media/saved.mp4")];

        let args = Args::parse_from(["rtmp-restream"]);
        assert_eq!(args.collect_entries(&settings), settings.playlist.files);

        let args = Args::parse_from(["rtmp-restream", "x.mp4", "y.mkv"]);
        assert_eq!(
            args.collect_entries(&settings),
            vec![PathBuf::from("x.mp4"), PathBuf::from("y.mkv")]
        );
    }

    #[test]
    fn test_optional_values_fall_back_to_defaults() {
        let args = Args::parse_from(["rtmp-restream", "--status-addr", "--save-playlist"]);
        assert_eq!(args.status_addr(), Some(SocketAddr::from(DEFAULT_STATUS_ADDR)));
        assert_eq!(args.save_playlist_path(), Some(default_playlist_path()));
        assert_eq!(args.playlist_path(), None);

        let args = Args::parse_from([
            "rtmp-restream",
            "--status-addr",
            "0.0.0.0:9000",
            "--playlist",
            "/tmp/list.json",
        ]);
        assert_eq!(args.status_addr(), Some("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(args.playlist_path(), Some(PathBuf::from("/tmp/list.json")));
        assert_eq!(args.save_playlist_path(), None);

        let args = Args::parse_from(["rtmp-restream"]);
        assert_eq!(args.status_addr(), None);
    }

    #[test]
    fn test_second_interrupt_exits() {
        let mut interrupts = InterruptState::default();
        assert_eq!(interrupts.press(), Interrupt::Stop);
        assert!(interrupts.stop_requested);
        assert_eq!(interrupts.press(), Interrupt::Exit);
        assert_eq!(interrupts.press(), Interrupt::Exit);
    }

    #[test]
    fn test_only_stopped_yields_exit_code() {
        assert_eq!(print_event(SessionEvent::Started), None);
        assert_eq!(print_event(SessionEvent::Log { line: "frame=1".into() }), None);
        assert_eq!(print_event(SessionEvent::Stopped { exit_code: 1 }), Some(1));
    }
}
