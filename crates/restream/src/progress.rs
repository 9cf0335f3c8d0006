//! Progress metrics parsed from ffmpeg diagnostic lines
//!
//! ffmpeg periodically rewrites a status line such as
//! `frame=  110 fps= 25 q=28.0 size=1024kB time=00:00:04.40 bitrate=1902.2kbits/s speed=1.01x`.
//! [`parse_progress`] turns one such line into a [`ProgressSample`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Structured progress fields extracted from one diagnostic line
///
/// A `None` field means the value was not present on the line, not zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressSample {
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<u64>,
    /// Literal speed token including the trailing `x`, e.g. `1.01x`
    pub speed: Option<String>,
}

impl ProgressSample {
    /// True if no field could be extracted
    pub fn is_empty(&self) -> bool {
        self.fps.is_none() && self.bitrate_kbps.is_none() && self.speed.is_none()
    }
}

/// Compiled field patterns; a pattern that fails to compile leaves its field absent
struct Patterns {
    fps: Option<Regex>,
    bitrate: Option<Regex>,
    speed: Option<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        fps: Regex::new(r"fps=\s*([0-9]+(?:\.[0-9]+)?)").ok(),
        bitrate: Regex::new(r"bitrate=\s*([0-9]+(?:\.[0-9]+)?)\s*([kM]?)bits/s").ok(),
        speed: Regex::new(r"speed=\s*([0-9]+(?:\.[0-9]+)?x)").ok(),
    })
}

/// Parse one diagnostic line into a progress sample
///
/// Returns `None` unless the line carries both an `fps=` and a `bitrate=`
/// marker. Individual fields that fail to match are left as `None`.
/// Bitrates in `Mbits/s` are scaled to kbps; all bitrates are truncated
/// toward zero.
pub fn parse_progress(line: &str) -> Option<ProgressSample> {
    if !line.contains("fps=") || !line.contains("bitrate=") {
        return None;
    }

    let p = patterns();
    let mut sample = ProgressSample::default();

    if let Some(caps) = p.fps.as_ref().and_then(|re| re.captures(line)) {
        sample.fps = caps[1].parse::<f64>().ok();
    }

    if let Some(caps) = p.bitrate.as_ref().and_then(|re| re.captures(line)) {
        if let Ok(value) = caps[1].parse::<f64>() {
            let kbps = match &caps[2] {
                "M" => value * 1000.0,
                _ => value,
            };
            sample.bitrate_kbps = Some(kbps.trunc() as u64);
        }
    }

    if let Some(caps) = p.speed.as_ref().and_then(|re| re.captures(line)) {
        sample.speed = Some(caps[1].to_string());
    }

    Some(sample)
}
