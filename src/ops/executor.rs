//! Operation execution.
//!
//! The executor ties the pieces together for one operation: validate the
//! options, resolve inputs into the job directory, run probe-dependent
//! checks, assemble the ffmpeg invocation, and commit the staged output as
//! the job's new artifact. Failures surface before side effects where
//! possible (validation and probe checks run before any encode starts).

use super::{
    music_mix_filter, scale_filter, subtitle_filter, xfade_chain_filter, MusicParams, Operation,
    SubtitleParams, SubtitleStyle, ThumbnailParams, TrimParams, AUDIO_BITRATE, VIDEO_CODEC,
    VIDEO_CRF, VIDEO_PRESET,
};
use crate::config::FfmpegConfig;
use crate::error::{Error, Result};
use crate::ffmpeg::probe::{probe_file, MediaInfo};
use crate::ffmpeg::FfmpegCommand;
use crate::resolve::{InputRef, Resolver};
use crate::store::{ArtifactRef, ArtifactStore, JobId};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Budget for a single ffprobe run; probing is cheap next to encoding.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame rate and sample rate every concat input is conformed to.
const CONCAT_FPS: u32 = 30;
const CONCAT_SAMPLE_RATE: u32 = 48_000;

/// Executes validated operations against a job.
pub struct Executor {
    store: ArtifactStore,
    resolver: Arc<Resolver>,
    op_timeout: Duration,
}

impl Executor {
    pub fn new(store: ArtifactStore, resolver: Arc<Resolver>, ffmpeg: &FfmpegConfig) -> Self {
        Self {
            store,
            resolver,
            op_timeout: Duration::from_secs(ffmpeg.operation_timeout_secs),
        }
    }

    /// The resolver this executor materializes inputs with.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Run one operation for `job`, producing its output artifact under the
    /// operation's default name.
    pub async fn execute(&self, job: &JobId, op: &Operation) -> Result<ArtifactRef> {
        self.execute_as(job, op, &op.output_name()).await
    }

    /// Run one operation with a caller-chosen output name. The pipeline uses
    /// this to number its intermediate artifacts.
    pub async fn execute_as(
        &self,
        job: &JobId,
        op: &Operation,
        output_name: &str,
    ) -> Result<ArtifactRef> {
        op.validate()?;
        let kind = op.kind();
        tracing::info!(job_id = %job, operation = kind.name(), "Executing operation");

        let artifact = match op {
            Operation::Merge {
                video,
                audio,
                params,
            } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let audio = self.resolver.resolve(job, "input_audio.mp3", audio).await?;
                let staged = self.store.stage(job, output_name)?;
                build_merge_command(&video, &audio, params.volume, staged.path(), self.op_timeout)
                    .run()
                    .await?;
                self.store.commit(job, staged)?
            }

            Operation::Concat { videos, params } => {
                self.concat(job, videos, params, output_name).await?
            }

            Operation::Subtitles {
                video,
                subtitles,
                params,
            } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let srt = self.resolver.resolve(job, "subtitles.srt", subtitles).await?;
                let staged = self.store.stage(job, output_name)?;
                build_subtitle_command(&video, &srt, params, staged.path(), self.op_timeout)
                    .run()
                    .await?;
                self.store.commit(job, staged)?
            }

            Operation::BackgroundMusic {
                video,
                music,
                params,
            } => {
                let video_path = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let music_path = self.resolver.resolve(job, "music.mp3", music).await?;

                let info = probe_file(&video_path, PROBE_TIMEOUT).await?;
                if !info.has_audio() {
                    return Err(Error::invalid_parameter(
                        "video has no audio track to mix music under",
                    ));
                }
                let duration = info.duration_secs.unwrap_or(60.0);

                let staged = self.store.stage(job, output_name)?;
                build_music_command(
                    &video_path,
                    &music_path,
                    params,
                    duration,
                    staged.path(),
                    self.op_timeout,
                )
                .run()
                .await?;
                self.store.commit(job, staged)?
            }

            Operation::Resize { video, params } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let (width, height) = params.target_resolution()?;
                let staged = self.store.stage(job, output_name)?;

                let mut cmd = FfmpegCommand::new("resize", self.op_timeout);
                cmd.input(&video)
                    .args([
                        "-vf",
                        &scale_filter(width, height, params.fit, &params.background_color),
                    ])
                    .args(["-c:v", VIDEO_CODEC, "-preset", VIDEO_PRESET, "-crf", VIDEO_CRF])
                    .args(["-c:a", "copy", "-movflags", "+faststart"])
                    .output(staged.path());
                cmd.run().await?;
                self.store.commit(job, staged)?
            }

            Operation::ExtractAudio { video, params } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let info = probe_file(&video, PROBE_TIMEOUT).await?;
                if !info.has_audio() {
                    return Err(Error::invalid_parameter("source has no audio stream"));
                }

                let staged = self.store.stage(job, output_name)?;
                let mut cmd = FfmpegCommand::new("extract_audio", self.op_timeout);
                cmd.input(&video)
                    .args(["-vn", "-acodec", params.format.codec()]);
                if params.format.uses_bitrate() {
                    cmd.args(["-b:a", AUDIO_BITRATE]);
                }
                cmd.output(staged.path());
                cmd.run().await?;
                self.store.commit(job, staged)?
            }

            Operation::Thumbnail { video, params } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let info = probe_file(&video, PROBE_TIMEOUT).await?;
                let timestamp = clamp_timestamp(params.timestamp_secs, info.duration_secs);

                let staged = self.store.stage(job, output_name)?;
                build_thumbnail_command(&video, params, timestamp, staged.path(), self.op_timeout)
                    .run()
                    .await?;
                self.store.commit(job, staged)?
            }

            Operation::Trim { video, params } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let duration = params.effective_duration()?;

                let info = probe_file(&video, PROBE_TIMEOUT).await?;
                if let Some(src_duration) = info.duration_secs {
                    if params.start_secs >= src_duration {
                        return Err(Error::InvalidRange(format!(
                            "start {} is past the source duration {src_duration}",
                            params.start_secs
                        )));
                    }
                }

                let staged = self.store.stage(job, output_name)?;
                build_trim_command(&video, params, duration, staged.path(), self.op_timeout)
                    .run()
                    .await?;
                self.store.commit(job, staged)?
            }

            Operation::Normalize { video, params } => {
                let video = self.resolver.resolve(job, "input_video.mp4", video).await?;
                let info = probe_file(&video, PROBE_TIMEOUT).await?;
                if !info.has_audio() {
                    return Err(Error::invalid_parameter("source has no audio to normalize"));
                }

                // Pass 1: measure. loudnorm prints its stats as JSON on stderr.
                let mut measure = FfmpegCommand::new("normalize", self.op_timeout);
                measure
                    .input(&video)
                    .args([
                        "-af",
                        &format!(
                            "loudnorm=I={}:TP={}:LRA=11:print_format=json",
                            params.target_lufs, params.peak_limit_db
                        ),
                    ])
                    .args(["-f", "null", "-"]);
                let output = measure.run().await?;
                let stats = parse_loudnorm_stats(&output.stderr)?;

                // Pass 2: apply with linear gain from the measured values.
                let staged = self.store.stage(job, output_name)?;
                let mut apply = FfmpegCommand::new("normalize", self.op_timeout);
                apply
                    .input(&video)
                    .args([
                        "-af",
                        &format!(
                            "loudnorm=I={}:TP={}:LRA=11:measured_I={}:measured_TP={}:\
                             measured_LRA={}:measured_thresh={}:offset={}:linear=true",
                            params.target_lufs,
                            params.peak_limit_db,
                            stats.input_i,
                            stats.input_tp,
                            stats.input_lra,
                            stats.input_thresh,
                            stats.target_offset
                        ),
                    ])
                    .args(["-c:v", "copy", "-c:a", "aac", "-b:a", AUDIO_BITRATE])
                    .args(["-movflags", "+faststart"])
                    .output(staged.path());
                apply.run().await?;
                self.store.commit(job, staged)?
            }
        };

        tracing::info!(
            job_id = %job,
            operation = kind.name(),
            artifact = %artifact.filename,
            size = artifact.size,
            "Operation complete"
        );
        Ok(artifact)
    }

    /// Resolve an input and probe it. Used by the probe endpoint and by the
    /// pipeline when it needs source metadata.
    pub async fn probe_input(&self, job: &JobId, input: &InputRef) -> Result<MediaInfo> {
        let path = self.resolver.resolve(job, "input_video.mp4", input).await?;
        probe_file(&path, PROBE_TIMEOUT).await
    }

    /// Probe an already-local artifact.
    pub async fn probe_artifact(&self, job: &JobId, name: &str) -> Result<MediaInfo> {
        let path = self.store.artifact_path(job, name)?;
        probe_file(&path, PROBE_TIMEOUT).await
    }

    /// Concatenate N inputs, conforming each to a common resolution, frame
    /// rate, and audio layout first. The conformed copies stay in the job as
    /// regular artifacts; the job lifecycle cleans them up.
    async fn concat(
        &self,
        job: &JobId,
        videos: &[InputRef],
        params: &super::ConcatParams,
        output_name: &str,
    ) -> Result<ArtifactRef> {
        let mut sources = Vec::with_capacity(videos.len());
        for (i, input) in videos.iter().enumerate() {
            let name = format!("input_{i:02}.mp4");
            sources.push(self.resolver.resolve(job, &name, input).await?);
        }

        // The first clip decides the target frame everything conforms to.
        let first = probe_file(&sources[0], PROBE_TIMEOUT).await?;
        let (width, height) = first
            .primary_video()
            .map(|v| (v.width, v.height))
            .filter(|&(w, h)| w > 0 && h > 0)
            .ok_or_else(|| Error::invalid_parameter("first concat input has no video stream"))?;

        let mut conformed = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let name = format!("norm_{i:02}.mp4");
            let staged = self.store.stage(job, &name)?;
            build_conform_command(source, width, height, staged.path(), self.op_timeout)
                .run()
                .await?;
            let artifact = self.store.commit(job, staged)?;
            conformed.push(self.store.artifact_path(job, &artifact.filename)?);
        }

        let staged = self.store.stage(job, output_name)?;
        match params.transition.xfade_name() {
            None => {
                let list = concat_list(&conformed);
                self.store.write(job, "concat_list.txt", list.as_bytes())?;
                let list_path = self.store.artifact_path(job, "concat_list.txt")?;

                let mut cmd = FfmpegCommand::new("concat", self.op_timeout);
                cmd.args(["-f", "concat", "-safe", "0"])
                    .input(&list_path)
                    .args(["-c", "copy", "-movflags", "+faststart"])
                    .output(staged.path());
                cmd.run().await?;
            }
            Some(transition) => {
                let mut durations = Vec::with_capacity(conformed.len());
                for path in &conformed {
                    let info = probe_file(path, PROBE_TIMEOUT).await?;
                    durations.push(info.duration_secs.ok_or_else(|| {
                        Error::execution("concat", "conformed clip reports no duration")
                    })?);
                }

                let filter = xfade_chain_filter(&durations, transition, params.transition_secs);
                let mut cmd = FfmpegCommand::new("concat", self.op_timeout);
                for path in &conformed {
                    cmd.input(path);
                }
                cmd.args(["-filter_complex", &filter])
                    .args(["-map", "[vout]", "-map", "[aout]"])
                    .args(["-c:v", VIDEO_CODEC, "-preset", VIDEO_PRESET, "-crf", VIDEO_CRF])
                    .args(["-c:a", "aac", "-b:a", AUDIO_BITRATE])
                    .args(["-movflags", "+faststart"])
                    .output(staged.path());
                cmd.run().await?;
            }
        }
        self.store.commit(job, staged)
    }
}

/// Clamp a thumbnail timestamp inside the source, stepping back slightly from
/// the very end so the seek always lands on a frame.
fn clamp_timestamp(requested: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 => requested.min((d - 0.1).max(0.0)),
        _ => requested,
    }
}

/// The `-f concat` demuxer list file body.
fn concat_list(paths: &[PathBuf]) -> String {
    let mut list = String::new();
    for path in paths {
        list.push_str(&format!("file '{}'\n", path.display()));
    }
    list
}

fn build_merge_command(
    video: &Path,
    audio: &Path,
    volume: f64,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("merge", timeout);
    cmd.input(video)
        .input(audio)
        .args(["-filter_complex", &format!("[1:a]volume={volume}[a]")])
        .args(["-map", "0:v", "-map", "[a]"])
        // Video passes through untouched; only the audio is re-encoded. The
        // added track simply ends when exhausted, the video keeps its length.
        .args(["-c:v", "copy", "-c:a", "aac", "-b:a", AUDIO_BITRATE])
        .args(["-movflags", "+faststart"])
        .output(out);
    cmd
}

fn build_subtitle_command(
    video: &Path,
    srt: &Path,
    params: &SubtitleParams,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("subtitles", timeout);
    match params.style {
        SubtitleStyle::Hardcoded => {
            cmd.input(video)
                .args(["-vf", &subtitle_filter(&srt.to_string_lossy(), params)])
                .args(["-c:v", VIDEO_CODEC, "-preset", VIDEO_PRESET, "-crf", VIDEO_CRF])
                .args(["-c:a", "copy"])
                .output(out);
        }
        SubtitleStyle::Soft => {
            cmd.input(video)
                .input(srt)
                .args(["-map", "0", "-map", "1"])
                .args(["-c", "copy", "-c:s", "mov_text"])
                .output(out);
        }
    }
    cmd
}

fn build_music_command(
    video: &Path,
    music: &Path,
    params: &MusicParams,
    video_duration: f64,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("background_music", timeout);
    cmd.input(video);
    if params.loop_music {
        // Loop the music input forever; amix duration=first plus -shortest
        // bound the output to the video.
        cmd.args(["-stream_loop", "-1"]);
    }
    cmd.input(music)
        .args(["-filter_complex", &music_mix_filter(params, video_duration)])
        .args(["-map", "0:v", "-map", "[aout]"])
        .args(["-c:v", "copy", "-c:a", "aac", "-b:a", AUDIO_BITRATE])
        .args(["-shortest", "-movflags", "+faststart"])
        .output(out);
    cmd
}

fn build_thumbnail_command(
    video: &Path,
    params: &ThumbnailParams,
    timestamp: f64,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("thumbnail", timeout);
    // -ss before -i: seek on the input side, decode only what's needed.
    cmd.args(["-ss", &timestamp.to_string()])
        .input(video)
        .args(["-vframes", "1"])
        .args([
            "-vf",
            &format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
                w = params.width,
                h = params.height
            ),
        ])
        .args(["-q:v", "2"])
        .output(out);
    cmd
}

fn build_trim_command(
    video: &Path,
    params: &TrimParams,
    duration: f64,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("trim", timeout);
    cmd.args(["-ss", &params.start_secs.to_string()])
        .input(video)
        .args(["-t", &duration.to_string()])
        // Stream copy: cuts land on keyframes, no quality loss.
        .args(["-c", "copy", "-movflags", "+faststart"])
        .output(out);
    cmd
}

/// Re-encode one clip to the common concat target.
fn build_conform_command(
    source: &Path,
    width: u32,
    height: u32,
    out: &Path,
    timeout: Duration,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("concat", timeout);
    cmd.input(source)
        .args([
            "-vf",
            &format!(
                "scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,\
                 fps={CONCAT_FPS}"
            ),
        ])
        .args(["-c:v", VIDEO_CODEC, "-preset", VIDEO_PRESET, "-crf", VIDEO_CRF])
        .args(["-c:a", "aac", "-b:a", AUDIO_BITRATE])
        .args(["-ar", &CONCAT_SAMPLE_RATE.to_string()])
        .output(out);
    cmd
}

/// The measurement block loudnorm prints on stderr during pass one.
#[derive(Debug, Deserialize)]
pub struct LoudnormStats {
    pub input_i: String,
    pub input_tp: String,
    pub input_lra: String,
    pub input_thresh: String,
    pub target_offset: String,
}

/// Extract the loudnorm JSON block from ffmpeg's stderr.
///
/// The block is the last `{ ... }` region of the output, after the normal
/// encode log lines.
pub fn parse_loudnorm_stats(stderr: &str) -> Result<LoudnormStats> {
    let start = stderr
        .rfind('{')
        .ok_or_else(|| Error::execution("normalize", "no loudnorm stats in ffmpeg output"))?;
    let end = stderr[start..]
        .find('}')
        .map(|i| start + i + 1)
        .ok_or_else(|| Error::execution("normalize", "truncated loudnorm stats"))?;

    serde_json::from_str(&stderr[start..end])
        .map_err(|e| Error::execution("normalize", format!("unparseable loudnorm stats: {e}")))
}
