//! Media operations.
//!
//! Each of the ten operation kinds is a validated parameter struct; the
//! [`Operation`] enum is the closed set dispatched by [`executor::Executor`].
//! Validation happens before any input is resolved or any process spawned.
//! Re-encodes share one profile throughout: libx264 at preset medium /
//! crf 23, aac 192k audio, `+faststart` mp4 output.

pub mod executor;

pub use executor::Executor;

use crate::error::{Error, Result};
use crate::resolve::InputRef;
use serde::{Deserialize, Serialize};

/// Video encode settings used whenever an operation must re-encode.
pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_PRESET: &str = "medium";
pub const VIDEO_CRF: &str = "23";
pub const AUDIO_BITRATE: &str = "192k";

/// The ten operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Merge,
    Concat,
    Subtitles,
    BackgroundMusic,
    Resize,
    ExtractAudio,
    Thumbnail,
    Trim,
    Normalize,
    Probe,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Merge => "merge",
            OperationKind::Concat => "concat",
            OperationKind::Subtitles => "subtitles",
            OperationKind::BackgroundMusic => "background_music",
            OperationKind::Resize => "resize",
            OperationKind::ExtractAudio => "extract_audio",
            OperationKind::Thumbnail => "thumbnail",
            OperationKind::Trim => "trim",
            OperationKind::Normalize => "normalize",
            OperationKind::Probe => "probe",
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

/// Merge a separately supplied audio track into a video at a given gain.
///
/// The added track simply ends when exhausted; the video always runs to its
/// own end and audio is never looped implicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeParams {
    /// Gain applied to the added audio track.
    pub volume: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl MergeParams {
    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::invalid_parameter(format!(
                "volume must be >= 0, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    None,
    Fade,
    Dissolve,
}

impl Transition {
    /// The xfade transition name, or `None` for direct concatenation.
    pub fn xfade_name(&self) -> Option<&'static str> {
        match self {
            Transition::None => None,
            Transition::Fade => Some("fade"),
            Transition::Dissolve => Some("dissolve"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatParams {
    pub transition: Transition,
    /// Cross-blend length at each boundary, seconds.
    pub transition_secs: f64,
}

impl Default for ConcatParams {
    fn default() -> Self {
        Self {
            transition: Transition::None,
            transition_secs: 0.5,
        }
    }
}

impl ConcatParams {
    pub fn validate(&self, input_count: usize) -> Result<()> {
        if input_count < 2 {
            return Err(Error::invalid_parameter(format!(
                "concat requires at least 2 videos, got {input_count}"
            )));
        }
        if self.transition != Transition::None
            && (!self.transition_secs.is_finite()
                || self.transition_secs <= 0.0
                || self.transition_secs > 5.0)
        {
            return Err(Error::invalid_parameter(format!(
                "transition duration must be in (0, 5] seconds, got {}",
                self.transition_secs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleStyle {
    /// Burn text into frames (irreversible).
    #[default]
    Hardcoded,
    /// Attach a selectable text stream (player-dependent).
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    #[default]
    Bottom,
    Top,
    Middle,
}

impl SubtitlePosition {
    /// SSA alignment code.
    pub fn alignment(&self) -> u8 {
        match self {
            SubtitlePosition::Bottom => 2,
            SubtitlePosition::Top => 8,
            SubtitlePosition::Middle => 5,
        }
    }

    pub fn margin_v(&self) -> u32 {
        match self {
            SubtitlePosition::Middle => 0,
            _ => 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleParams {
    pub style: SubtitleStyle,
    /// Font size; applies to hardcoded rendering only.
    pub font_size: u32,
    /// Screen position; applies to hardcoded rendering only.
    pub position: SubtitlePosition,
}

impl Default for SubtitleParams {
    fn default() -> Self {
        Self {
            style: SubtitleStyle::Hardcoded,
            font_size: 24,
            position: SubtitlePosition::Bottom,
        }
    }
}

impl SubtitleParams {
    pub fn validate(&self) -> Result<()> {
        if !(8..=72).contains(&self.font_size) {
            return Err(Error::invalid_parameter(format!(
                "font_size must be in 8..=72, got {}",
                self.font_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicParams {
    /// Gain for the added music track.
    pub music_volume: f64,
    /// Gain for the video's existing audio.
    pub voice_volume: f64,
    /// Repeat the music to cover the full video duration if shorter.
    pub loop_music: bool,
    /// Linear fade over the trailing N seconds; 0 disables.
    pub fade_out_secs: f64,
}

impl Default for MusicParams {
    fn default() -> Self {
        Self {
            music_volume: 0.15,
            voice_volume: 1.0,
            loop_music: true,
            fade_out_secs: 2.0,
        }
    }
}

impl MusicParams {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("music_volume", self.music_volume),
            ("voice_volume", self.voice_volume),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::invalid_parameter(format!(
                    "{name} must be >= 0, got {v}"
                )));
            }
        }
        if !self.fade_out_secs.is_finite() || self.fade_out_secs < 0.0 {
            return Err(Error::invalid_parameter(format!(
                "fade_out must be >= 0, got {}",
                self.fade_out_secs
            )));
        }
        Ok(())
    }
}

/// Named platform presets mapping to a target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    YoutubeShorts,
    Tiktok,
    InstagramReels,
    InstagramFeed,
    YoutubeLong,
    Youtube4k,
    Linkedin,
}

impl Platform {
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Platform::YoutubeShorts | Platform::Tiktok | Platform::InstagramReels => (1080, 1920),
            Platform::InstagramFeed => (1080, 1080),
            Platform::YoutubeLong | Platform::Linkedin => (1920, 1080),
            Platform::Youtube4k => (3840, 2160),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Preserve aspect ratio, letterbox/pillarbox with the background color.
    #[default]
    Contain,
    /// Fill the frame, cropping overflow.
    Cover,
    /// Non-uniform scale to the exact target.
    Stretch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeParams {
    pub preset: Option<Platform>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub background_color: String,
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self {
            preset: None,
            width: None,
            height: None,
            fit: Fit::Contain,
            background_color: "black".to_string(),
        }
    }
}

impl ResizeParams {
    /// The target resolution: preset wins over explicit dimensions; with
    /// neither, 1920x1080.
    pub fn target_resolution(&self) -> Result<(u32, u32)> {
        if let Some(preset) = self.preset {
            return Ok(preset.resolution());
        }
        let width = self.width.unwrap_or(1920);
        let height = self.height.unwrap_or(1080);
        for (name, v) in [("width", width), ("height", height)] {
            if !(16..=7680).contains(&v) {
                return Err(Error::invalid_parameter(format!(
                    "{name} must be in 16..=7680, got {v}"
                )));
            }
            if v % 2 != 0 {
                return Err(Error::invalid_parameter(format!(
                    "{name} must be even for H.264 output, got {v}"
                )));
            }
        }
        Ok((width, height))
    }

    pub fn validate(&self) -> Result<()> {
        self.target_resolution().map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Aac,
    Wav,
}

impl AudioFormat {
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Aac => "aac",
            AudioFormat::Wav => "pcm_s16le",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Whether `-b:a` applies (lossless wav has no bitrate knob).
    pub fn uses_bitrate(&self) -> bool {
        !matches!(self, AudioFormat::Wav)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractParams {
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailParams {
    /// Sample point, seconds; clamped into `[0, duration)` at execution.
    pub timestamp_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailParams {
    fn default() -> Self {
        Self {
            timestamp_secs: 5.0,
            width: 1280,
            height: 720,
        }
    }
}

impl ThumbnailParams {
    pub fn validate(&self) -> Result<()> {
        if !self.timestamp_secs.is_finite() || self.timestamp_secs < 0.0 {
            return Err(Error::invalid_parameter(format!(
                "timestamp must be >= 0, got {}",
                self.timestamp_secs
            )));
        }
        for (name, v) in [("width", self.width), ("height", self.height)] {
            if !(16..=7680).contains(&v) {
                return Err(Error::invalid_parameter(format!(
                    "{name} must be in 16..=7680, got {v}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrimParams {
    pub start_secs: f64,
    /// Exclusive end, seconds. `duration_secs` wins if both are given.
    pub end_secs: Option<f64>,
    pub duration_secs: Option<f64>,
}

impl TrimParams {
    /// The validated cut length.
    pub fn effective_duration(&self) -> Result<f64> {
        if !self.start_secs.is_finite() || self.start_secs < 0.0 {
            return Err(Error::InvalidRange(format!(
                "start must be >= 0, got {}",
                self.start_secs
            )));
        }
        let duration = match (self.duration_secs, self.end_secs) {
            (Some(d), _) => d,
            (None, Some(end)) => {
                if end <= self.start_secs {
                    return Err(Error::InvalidRange(format!(
                        "start ({}) must be before end ({end})",
                        self.start_secs
                    )));
                }
                end - self.start_secs
            }
            (None, None) => {
                return Err(Error::invalid_parameter(
                    "either end or duration is required",
                ));
            }
        };
        if !duration.is_finite() || duration <= 0.0 {
            return Err(Error::InvalidRange(format!(
                "duration must be > 0, got {duration}"
            )));
        }
        Ok(duration)
    }

    pub fn validate(&self) -> Result<()> {
        self.effective_duration().map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeParams {
    /// Target integrated loudness, LUFS.
    pub target_lufs: f64,
    /// True-peak ceiling, dBTP.
    pub peak_limit_db: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            target_lufs: -14.0,
            peak_limit_db: -1.0,
        }
    }
}

impl NormalizeParams {
    pub fn validate(&self) -> Result<()> {
        if !(-70.0..=-5.0).contains(&self.target_lufs) {
            return Err(Error::invalid_parameter(format!(
                "target_lufs must be in [-70, -5], got {}",
                self.target_lufs
            )));
        }
        if !(-9.0..=0.0).contains(&self.peak_limit_db) {
            return Err(Error::invalid_parameter(format!(
                "peak_limit must be in [-9, 0], got {}",
                self.peak_limit_db
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operation: closed tagged variant over the artifact-producing kinds
// ---------------------------------------------------------------------------

/// One validated media transformation with its resolved-to-be inputs.
///
/// Probe is not here: it produces no artifact and is exposed separately on
/// the executor.
#[derive(Debug, Clone)]
pub enum Operation {
    Merge {
        video: InputRef,
        audio: InputRef,
        params: MergeParams,
    },
    Concat {
        videos: Vec<InputRef>,
        params: ConcatParams,
    },
    Subtitles {
        video: InputRef,
        subtitles: InputRef,
        params: SubtitleParams,
    },
    BackgroundMusic {
        video: InputRef,
        music: InputRef,
        params: MusicParams,
    },
    Resize {
        video: InputRef,
        params: ResizeParams,
    },
    ExtractAudio {
        video: InputRef,
        params: ExtractParams,
    },
    Thumbnail {
        video: InputRef,
        params: ThumbnailParams,
    },
    Trim {
        video: InputRef,
        params: TrimParams,
    },
    Normalize {
        video: InputRef,
        params: NormalizeParams,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Merge { .. } => OperationKind::Merge,
            Operation::Concat { .. } => OperationKind::Concat,
            Operation::Subtitles { .. } => OperationKind::Subtitles,
            Operation::BackgroundMusic { .. } => OperationKind::BackgroundMusic,
            Operation::Resize { .. } => OperationKind::Resize,
            Operation::ExtractAudio { .. } => OperationKind::ExtractAudio,
            Operation::Thumbnail { .. } => OperationKind::Thumbnail,
            Operation::Trim { .. } => OperationKind::Trim,
            Operation::Normalize { .. } => OperationKind::Normalize,
        }
    }

    /// Validate operation options. Runs before any resolution or spawn.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Merge { params, .. } => params.validate(),
            Operation::Concat { videos, params } => params.validate(videos.len()),
            Operation::Subtitles { params, .. } => params.validate(),
            Operation::BackgroundMusic { params, .. } => params.validate(),
            Operation::Resize { params, .. } => params.validate(),
            Operation::ExtractAudio { .. } => Ok(()),
            Operation::Thumbnail { params, .. } => params.validate(),
            Operation::Trim { params, .. } => params.validate(),
            Operation::Normalize { params, .. } => params.validate(),
        }
    }

    /// The operation-chosen output artifact name.
    pub fn output_name(&self) -> String {
        match self {
            Operation::Merge { .. } => "merged.mp4".to_string(),
            Operation::Concat { .. } => "concat.mp4".to_string(),
            Operation::Subtitles { .. } => "subtitled.mp4".to_string(),
            Operation::BackgroundMusic { .. } => "with_music.mp4".to_string(),
            Operation::Resize { .. } => "resized.mp4".to_string(),
            Operation::ExtractAudio { params, .. } => format!("audio.{}", params.format.extension()),
            Operation::Thumbnail { .. } => "thumbnail.jpg".to_string(),
            Operation::Trim { .. } => "trimmed.mp4".to_string(),
            Operation::Normalize { .. } => "normalized.mp4".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter builders (pure string assembly, no I/O)
// ---------------------------------------------------------------------------

/// `-vf` expression for a resize under the given fit policy.
pub fn scale_filter(width: u32, height: u32, fit: Fit, background: &str) -> String {
    match fit {
        Fit::Contain => format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color={background},setsar=1"
        ),
        Fit::Cover => format!(
            "scale={width}:{height}:force_original_aspect_ratio=increase,\
             crop={width}:{height},setsar=1"
        ),
        Fit::Stretch => format!("scale={width}:{height},setsar=1"),
    }
}

/// `-vf` expression burning subtitles with SSA styling.
pub fn subtitle_filter(srt_path: &str, params: &SubtitleParams) -> String {
    format!(
        "subtitles='{}':force_style='FontSize={},PrimaryColour=&H00FFFFFF,\
         OutlineColour=&H00000000,BorderStyle=3,Outline=2,MarginV={},Alignment={}'",
        srt_path,
        params.font_size,
        params.position.margin_v(),
        params.position.alignment()
    )
}

/// `-filter_complex` mixing a music bed under the existing audio.
///
/// The fade-out is anchored to the end of the video, so the caller supplies
/// the probed video duration.
pub fn music_mix_filter(params: &MusicParams, video_duration_secs: f64) -> String {
    let mut music = format!("[1:a]volume={}", params.music_volume);
    if params.fade_out_secs > 0.0 {
        let fade_start = (video_duration_secs - params.fade_out_secs).max(0.0);
        music.push_str(&format!(
            ",afade=t=out:st={fade_start}:d={}",
            params.fade_out_secs
        ));
    }
    music.push_str("[music]");

    format!(
        "[0:a]volume={}[voice];{music};[voice][music]amix=inputs=2:duration=first[aout]",
        params.voice_volume
    )
}

/// `-filter_complex` chaining N inputs with xfade/acrossfade transitions.
///
/// `durations` are the probed lengths of each (already normalized) input.
/// The final labels are `[vout]` and `[aout]`.
pub fn xfade_chain_filter(durations: &[f64], transition: &str, blend_secs: f64) -> String {
    debug_assert!(durations.len() >= 2);

    let mut parts = Vec::new();
    let mut offset = 0.0;
    let mut prev_v = "[0:v]".to_string();
    let mut prev_a = "[0:a]".to_string();

    for i in 1..durations.len() {
        offset += durations[i - 1] - blend_secs;
        let v_label = if i == durations.len() - 1 {
            "[vout]".to_string()
        } else {
            format!("[v{i}]")
        };
        let a_label = if i == durations.len() - 1 {
            "[aout]".to_string()
        } else {
            format!("[a{i}]")
        };
        parts.push(format!(
            "{prev_v}[{i}:v]xfade=transition={transition}:duration={blend_secs}:offset={offset}{v_label}"
        ));
        parts.push(format!(
            "{prev_a}[{i}:a]acrossfade=d={blend_secs}{a_label}"
        ));
        prev_v = v_label;
        prev_a = a_label;
    }

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_volume_must_be_nonnegative() {
        assert!(MergeParams { volume: 0.0 }.validate().is_ok());
        assert!(MergeParams { volume: 1.5 }.validate().is_ok());
        assert!(MergeParams { volume: -0.1 }.validate().is_err());
        assert!(MergeParams { volume: f64::NAN }.validate().is_err());
    }

    #[test]
    fn concat_needs_two_inputs() {
        let params = ConcatParams::default();
        assert!(params.validate(1).is_err());
        assert!(params.validate(2).is_ok());
    }

    #[test]
    fn concat_transition_duration_bounds() {
        let mut params = ConcatParams {
            transition: Transition::Fade,
            transition_secs: 0.5,
        };
        assert!(params.validate(3).is_ok());
        params.transition_secs = 0.0;
        assert!(params.validate(3).is_err());
        params.transition_secs = 6.0;
        assert!(params.validate(3).is_err());
        // Duration is irrelevant for direct concatenation.
        params.transition = Transition::None;
        assert!(params.validate(3).is_ok());
    }

    #[test]
    fn subtitle_font_size_bounds() {
        let mut params = SubtitleParams::default();
        assert!(params.validate().is_ok());
        params.font_size = 7;
        assert!(params.validate().is_err());
        params.font_size = 73;
        assert!(params.validate().is_err());
    }

    #[test]
    fn subtitle_positions_map_to_ssa() {
        assert_eq!(SubtitlePosition::Bottom.alignment(), 2);
        assert_eq!(SubtitlePosition::Top.alignment(), 8);
        assert_eq!(SubtitlePosition::Middle.alignment(), 5);
    }

    #[test]
    fn platform_presets() {
        assert_eq!(Platform::YoutubeShorts.resolution(), (1080, 1920));
        assert_eq!(Platform::InstagramFeed.resolution(), (1080, 1080));
        assert_eq!(Platform::YoutubeLong.resolution(), (1920, 1080));
        assert_eq!(Platform::Youtube4k.resolution(), (3840, 2160));
    }

    #[test]
    fn resize_preset_wins_over_dimensions() {
        let params = ResizeParams {
            preset: Some(Platform::Tiktok),
            width: Some(640),
            height: Some(480),
            ..Default::default()
        };
        assert_eq!(params.target_resolution().unwrap(), (1080, 1920));
    }

    #[test]
    fn resize_rejects_odd_and_extreme_dimensions() {
        let mut params = ResizeParams {
            width: Some(641),
            height: Some(480),
            ..Default::default()
        };
        assert!(params.validate().is_err());
        params.width = Some(8);
        assert!(params.validate().is_err());
        params.width = Some(8000);
        assert!(params.validate().is_err());
        params.width = Some(640);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn trim_duration_wins_over_end() {
        let params = TrimParams {
            start_secs: 5.0,
            end_secs: Some(30.0),
            duration_secs: Some(10.0),
        };
        assert_eq!(params.effective_duration().unwrap(), 10.0);
    }

    #[test]
    fn trim_end_derives_duration() {
        let params = TrimParams {
            start_secs: 5.0,
            end_secs: Some(30.0),
            duration_secs: None,
        };
        assert_eq!(params.effective_duration().unwrap(), 25.0);
    }

    #[test]
    fn trim_start_at_or_after_end_is_invalid_range() {
        let params = TrimParams {
            start_secs: 30.0,
            end_secs: Some(30.0),
            duration_secs: None,
        };
        assert!(matches!(
            params.effective_duration().unwrap_err(),
            Error::InvalidRange(_)
        ));
    }

    #[test]
    fn trim_requires_end_or_duration() {
        let params = TrimParams {
            start_secs: 0.0,
            end_secs: None,
            duration_secs: None,
        };
        assert!(matches!(
            params.effective_duration().unwrap_err(),
            Error::InvalidParameter(_)
        ));
    }

    #[test]
    fn normalize_bounds() {
        assert!(NormalizeParams::default().validate().is_ok());
        assert!(NormalizeParams {
            target_lufs: -80.0,
            peak_limit_db: -1.0
        }
        .validate()
        .is_err());
        assert!(NormalizeParams {
            target_lufs: -14.0,
            peak_limit_db: 1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn audio_format_codecs() {
        assert_eq!(AudioFormat::Mp3.codec(), "libmp3lame");
        assert_eq!(AudioFormat::Aac.codec(), "aac");
        assert_eq!(AudioFormat::Wav.codec(), "pcm_s16le");
        assert!(!AudioFormat::Wav.uses_bitrate());
    }

    #[test]
    fn output_names_are_operation_chosen() {
        let video = InputRef::Url("http://x/v.mp4".into());
        let op = Operation::ExtractAudio {
            video: video.clone(),
            params: ExtractParams {
                format: AudioFormat::Wav,
            },
        };
        assert_eq!(op.output_name(), "audio.wav");

        let op = Operation::Trim {
            video,
            params: TrimParams::default(),
        };
        assert_eq!(op.output_name(), "trimmed.mp4");
    }

    #[test]
    fn scale_filter_contain() {
        let f = scale_filter(1080, 1920, Fit::Contain, "black");
        assert!(f.contains("force_original_aspect_ratio=decrease"));
        assert!(f.contains("pad=1080:1920"));
        assert!(f.contains("color=black"));
    }

    #[test]
    fn scale_filter_cover_and_stretch() {
        let cover = scale_filter(1080, 1080, Fit::Cover, "black");
        assert!(cover.contains("crop=1080:1080"));
        let stretch = scale_filter(640, 480, Fit::Stretch, "black");
        assert_eq!(stretch, "scale=640:480,setsar=1");
    }

    #[test]
    fn subtitle_filter_styles() {
        let f = subtitle_filter("/jobs/j1/subtitles.srt", &SubtitleParams::default());
        assert!(f.starts_with("subtitles='/jobs/j1/subtitles.srt'"));
        assert!(f.contains("FontSize=24"));
        assert!(f.contains("Alignment=2"));
        assert!(f.contains("MarginV=50"));
    }

    #[test]
    fn music_filter_with_fade() {
        let f = music_mix_filter(&MusicParams::default(), 60.0);
        assert!(f.contains("[0:a]volume=1[voice]"));
        assert!(f.contains("volume=0.15"));
        assert!(f.contains("afade=t=out:st=58:d=2"));
        assert!(f.ends_with("amix=inputs=2:duration=first[aout]"));
    }

    #[test]
    fn music_filter_fade_clamps_to_zero() {
        let params = MusicParams {
            fade_out_secs: 10.0,
            ..Default::default()
        };
        let f = music_mix_filter(&params, 4.0);
        assert!(f.contains("st=0"));
    }

    #[test]
    fn music_filter_without_fade() {
        let params = MusicParams {
            fade_out_secs: 0.0,
            ..Default::default()
        };
        let f = music_mix_filter(&params, 60.0);
        assert!(!f.contains("afade"));
    }

    #[test]
    fn xfade_chain_two_inputs() {
        let f = xfade_chain_filter(&[10.0, 8.0], "fade", 0.5);
        assert_eq!(
            f,
            "[0:v][1:v]xfade=transition=fade:duration=0.5:offset=9.5[vout];\
             [0:a][1:a]acrossfade=d=0.5[aout]"
        );
    }

    #[test]
    fn xfade_chain_three_inputs_offsets_accumulate() {
        let f = xfade_chain_filter(&[10.0, 8.0, 6.0], "dissolve", 0.5);
        // First boundary at 9.5, second at 9.5 + 7.5 = 17.
        assert!(f.contains("offset=9.5[v1]"));
        assert!(f.contains("offset=17[vout]"));
        assert!(f.contains("[v1][2:v]"));
        assert!(f.contains("[a1][2:a]"));
    }
}
