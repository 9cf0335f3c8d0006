//! Encoder process launching

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_command, spawn_encoder, EncodingParams, LaunchError, SpawnedEncoder};
