//! ffprobe-based media inspection.

use super::FfmpegCommand;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Parsed metadata for one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub container: String,
    /// Container-level duration in seconds, if the format reports one.
    pub duration_secs: Option<f64>,
    pub size_bytes: u64,
    pub bit_rate: Option<u64>,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: String,
    pub channels: u32,
    pub sample_rate: Option<u32>,
}

impl MediaInfo {
    /// The primary (first) video stream, if any.
    pub fn primary_video(&self) -> Option<&VideoStream> {
        self.video_streams.first()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
}

/// Probe a local file with ffprobe.
pub async fn probe_file(path: &Path, timeout: Duration) -> Result<MediaInfo> {
    let mut cmd = FfmpegCommand::probe("probe", timeout);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path.to_string_lossy().to_string());

    let output = cmd.run().await?;
    parse_ffprobe_json(&output.stdout)
}

/// Parse ffprobe's `-print_format json` output.
pub fn parse_ffprobe_json(json: &str) -> Result<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::execution("probe", format!("unparseable ffprobe output: {e}")))?;

    let mut info = MediaInfo {
        container: parsed.format.format_name,
        duration_secs: parsed.format.duration.and_then(|s| s.parse().ok()),
        size_bytes: parsed
            .format
            .size
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        bit_rate: parsed.format.bit_rate.and_then(|s| s.parse().ok()),
        video_streams: Vec::new(),
        audio_streams: Vec::new(),
        subtitle_streams: 0,
    };

    for stream in parsed.streams {
        match stream.codec_type.as_str() {
            "video" => info.video_streams.push(VideoStream {
                codec: stream.codec_name.unwrap_or_default(),
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                frame_rate: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
            }),
            "audio" => info.audio_streams.push(AudioStream {
                codec: stream.codec_name.unwrap_or_default(),
                channels: stream.channels.unwrap_or(2),
                sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
            }),
            "subtitle" => info.subtitle_streams += 1,
            _ => {}
        }
    }

    Ok(info)
}

fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.parse().ok()
}
