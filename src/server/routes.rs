//! Request handlers and wire DTOs.
//!
//! Request bodies use a flat JSON vocabulary (`video_url`, `video_job_id`,
//! `transition_duration`, ...); the handlers translate them into typed
//! operations and hand off to the executor. Every fallible handler returns
//! `Result<_, AppError>` so error mapping lives in one place.

use super::error::AppError;
use super::AppContext;
use crate::error::Error;
use crate::ffmpeg::{self, probe::MediaInfo};
use crate::ops::{
    AudioFormat, ConcatParams, ExtractParams, Fit, MergeParams, MusicParams, NormalizeParams,
    Operation, Platform, ResizeParams, SubtitleParams, SubtitlePosition, SubtitleStyle,
    ThumbnailParams, Transition, TrimParams,
};
use crate::pipeline::{PipelineRequest, PipelineStatus};
use crate::resolve::InputRef;
use crate::store::{ArtifactRef, JobId, MediaKind};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

// ---------------------------------------------------------------------------
// Shared request vocabulary
// ---------------------------------------------------------------------------

/// The source-video part shared by every operation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoSource {
    /// A job already in this service's store; defaults to its newest artifact.
    pub video_job_id: Option<String>,
    /// Specific artifact within `video_job_id`.
    pub video_filename: Option<String>,
    /// A job on the upstream renderer; fetched from `{base}/video/{id}`.
    pub render_job_id: Option<String>,
    /// Any HTTP(S) URL.
    pub video_url: Option<String>,
}

impl VideoSource {
    fn into_input(self) -> Result<InputRef, Error> {
        if let Some(job) = self.video_job_id {
            return Ok(InputRef::Artifact {
                job_id: JobId::parse(&job)?,
                filename: self.video_filename,
            });
        }
        if let Some(id) = self.render_job_id {
            return Ok(InputRef::RenderJob(id));
        }
        if let Some(url) = self.video_url {
            return Ok(InputRef::Url(url));
        }
        Err(Error::invalid_parameter(
            "one of video_job_id, render_job_id, or video_url is required",
        ))
    }
}

/// Pick the job the output lands in: an explicit `job_id` wins, then the
/// source job (so derived artifacts accumulate alongside their source), then
/// a fresh one. Only names the job; handlers create the directory after the
/// request validates, so a rejected request leaves nothing behind.
fn target_job_id(explicit: Option<&str>, source: &VideoSource) -> Option<String> {
    explicit.or(source.video_job_id.as_deref()).map(str::to_string)
}

/// Standard success body for artifact-producing operations.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub job_id: String,
    pub operation: &'static str,
    pub output_file: String,
    pub output_url: String,
    pub file_size: u64,
}

impl OperationResponse {
    fn new(operation: &'static str, artifact: &ArtifactRef) -> Self {
        Self {
            job_id: artifact.job_id.to_string(),
            operation,
            output_file: artifact.filename.clone(),
            output_url: format!("/download/{}/{}", artifact.job_id, artifact.filename),
            file_size: artifact.size,
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

fn default_transition_duration() -> f64 {
    0.5
}

fn default_font_size() -> u32 {
    24
}

fn default_music_volume() -> f64 {
    0.15
}

fn default_true() -> bool {
    true
}

fn default_fade_out() -> f64 {
    2.0
}

fn default_background_color() -> String {
    "black".to_string()
}

fn default_timestamp() -> f64 {
    5.0
}

fn default_thumb_width() -> u32 {
    1280
}

fn default_thumb_height() -> u32 {
    720
}

fn default_target_level() -> f64 {
    -14.0
}

fn default_peak_limit() -> f64 {
    -1.0
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn info(State(ctx): State<AppContext>) -> impl IntoResponse {
    let ffmpeg_version = ffmpeg::ffmpeg_version().await;
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": ffmpeg_version,
        "renderer_url": ctx.config.renderer.base_url,
        "endpoints": [
            "POST /merge",
            "POST /concat",
            "POST /add-subtitles",
            "POST /add-background-music",
            "POST /resize",
            "POST /extract-audio",
            "POST /thumbnail",
            "POST /trim",
            "POST /normalize-audio",
            "POST /probe",
            "POST /full-pipeline",
            "GET /download/{job_id}/{filename}",
            "GET /jobs/{job_id}/artifacts",
            "DELETE /cleanup/{job_id}",
            "DELETE /cleanup-all",
        ],
    }))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(flatten)]
    video: VideoSource,
    audio_base64: Option<String>,
    audio_url: Option<String>,
    audio_job_id: Option<String>,
    audio_filename: Option<String>,
    #[serde(default = "default_volume")]
    volume: f64,
    job_id: Option<String>,
}

impl MergeRequest {
    fn audio_input(&self) -> Result<InputRef, Error> {
        if let Some(data) = &self.audio_base64 {
            return Ok(InputRef::Base64(data.clone()));
        }
        if let Some(url) = &self.audio_url {
            return Ok(InputRef::Url(url.clone()));
        }
        if let Some(job) = &self.audio_job_id {
            return Ok(InputRef::Artifact {
                job_id: JobId::parse(job)?,
                filename: self.audio_filename.clone(),
            });
        }
        Err(Error::invalid_parameter(
            "one of audio_base64, audio_url, or audio_job_id is required",
        ))
    }
}

pub async fn merge(
    State(ctx): State<AppContext>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Merge {
        audio: req.audio_input()?,
        video: req.video.into_input()?,
        params: MergeParams { volume: req.volume },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("merge", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct ConcatRequest {
    #[serde(default)]
    video_job_ids: Vec<String>,
    #[serde(default)]
    video_urls: Vec<String>,
    #[serde(default)]
    transition: Transition,
    #[serde(default = "default_transition_duration")]
    transition_duration: f64,
    job_id: Option<String>,
}

pub async fn concat(
    State(ctx): State<AppContext>,
    Json(req): Json<ConcatRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let mut videos = Vec::new();
    for id in &req.video_job_ids {
        videos.push(InputRef::Artifact {
            job_id: JobId::parse(id)?,
            filename: None,
        });
    }
    for url in &req.video_urls {
        videos.push(InputRef::Url(url.clone()));
    }

    let op = Operation::Concat {
        videos,
        params: ConcatParams {
            transition: req.transition,
            transition_secs: req.transition_duration,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(req.job_id.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("concat", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct SubtitlesRequest {
    #[serde(flatten)]
    video: VideoSource,
    /// Inline SRT text.
    subtitles: Option<String>,
    subtitles_url: Option<String>,
    #[serde(default)]
    style: SubtitleStyle,
    #[serde(default = "default_font_size")]
    font_size: u32,
    #[serde(default)]
    position: SubtitlePosition,
    job_id: Option<String>,
}

pub async fn add_subtitles(
    State(ctx): State<AppContext>,
    Json(req): Json<SubtitlesRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let subtitles = match (&req.subtitles, &req.subtitles_url) {
        (Some(text), _) => InputRef::Text(text.clone()),
        (None, Some(url)) => InputRef::Url(url.clone()),
        (None, None) => {
            return Err(Error::invalid_parameter(
                "either subtitles or subtitles_url is required",
            )
            .into());
        }
    };

    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Subtitles {
        video: req.video.into_input()?,
        subtitles,
        params: SubtitleParams {
            style: req.style,
            font_size: req.font_size,
            position: req.position,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("subtitles", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct MusicRequest {
    #[serde(flatten)]
    video: VideoSource,
    music_url: Option<String>,
    music_base64: Option<String>,
    #[serde(default = "default_music_volume")]
    music_volume: f64,
    #[serde(default = "default_volume")]
    voice_volume: f64,
    #[serde(default = "default_true")]
    loop_music: bool,
    #[serde(default = "default_fade_out")]
    fade_out: f64,
    job_id: Option<String>,
}

pub async fn add_background_music(
    State(ctx): State<AppContext>,
    Json(req): Json<MusicRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let music = match (&req.music_url, &req.music_base64) {
        (Some(url), _) => InputRef::Url(url.clone()),
        (None, Some(data)) => InputRef::Base64(data.clone()),
        (None, None) => {
            return Err(
                Error::invalid_parameter("either music_url or music_base64 is required").into(),
            );
        }
    };

    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::BackgroundMusic {
        video: req.video.into_input()?,
        music,
        params: MusicParams {
            music_volume: req.music_volume,
            voice_volume: req.voice_volume,
            loop_music: req.loop_music,
            fade_out_secs: req.fade_out,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("background_music", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    #[serde(flatten)]
    video: VideoSource,
    platform: Option<Platform>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    fit: Fit,
    #[serde(default = "default_background_color")]
    background_color: String,
    job_id: Option<String>,
}

pub async fn resize(
    State(ctx): State<AppContext>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Resize {
        video: req.video.into_input()?,
        params: ResizeParams {
            preset: req.platform,
            width: req.width,
            height: req.height,
            fit: req.fit,
            background_color: req.background_color,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("resize", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct ExtractAudioRequest {
    #[serde(flatten)]
    video: VideoSource,
    #[serde(default)]
    format: AudioFormat,
    job_id: Option<String>,
}

pub async fn extract_audio(
    State(ctx): State<AppContext>,
    Json(req): Json<ExtractAudioRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::ExtractAudio {
        video: req.video.into_input()?,
        params: ExtractParams { format: req.format },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("extract_audio", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailRequest {
    #[serde(flatten)]
    video: VideoSource,
    #[serde(default = "default_timestamp")]
    timestamp: f64,
    #[serde(default = "default_thumb_width")]
    width: u32,
    #[serde(default = "default_thumb_height")]
    height: u32,
    job_id: Option<String>,
}

pub async fn thumbnail(
    State(ctx): State<AppContext>,
    Json(req): Json<ThumbnailRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Thumbnail {
        video: req.video.into_input()?,
        params: ThumbnailParams {
            timestamp_secs: req.timestamp,
            width: req.width,
            height: req.height,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("thumbnail", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct TrimRequest {
    #[serde(flatten)]
    video: VideoSource,
    #[serde(default)]
    start: f64,
    end: Option<f64>,
    duration: Option<f64>,
    job_id: Option<String>,
}

pub async fn trim(
    State(ctx): State<AppContext>,
    Json(req): Json<TrimRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Trim {
        video: req.video.into_input()?,
        params: TrimParams {
            start_secs: req.start,
            end_secs: req.end,
            duration_secs: req.duration,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("trim", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    #[serde(flatten)]
    video: VideoSource,
    #[serde(default = "default_target_level")]
    target_level: f64,
    #[serde(default = "default_peak_limit")]
    peak_limit: f64,
    job_id: Option<String>,
}

pub async fn normalize_audio(
    State(ctx): State<AppContext>,
    Json(req): Json<NormalizeRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);
    let op = Operation::Normalize {
        video: req.video.into_input()?,
        params: NormalizeParams {
            target_lufs: req.target_level,
            peak_limit_db: req.peak_limit,
        },
    };
    op.validate()?;
    let job = ctx.store.create_job(target.as_deref())?;
    let artifact = ctx.executor.execute(&job, &op).await?;
    Ok(Json(OperationResponse::new("normalize", &artifact)))
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    #[serde(flatten)]
    video: VideoSource,
}

pub async fn probe(
    State(ctx): State<AppContext>,
    Json(req): Json<ProbeRequest>,
) -> Result<Json<MediaInfo>, AppError> {
    match req.video.into_input()? {
        // Already in the store: probe in place.
        InputRef::Artifact { job_id, filename } => {
            let name = match filename {
                Some(name) => name,
                None => ctx.store.latest(&job_id)?.filename,
            };
            Ok(Json(ctx.executor.probe_artifact(&job_id, &name).await?))
        }
        // Remote sources need somewhere to land; a throwaway job holds the
        // bytes only for the duration of the probe.
        input => {
            let scratch = ctx.store.create_job(None)?;
            let result = ctx.executor.probe_input(&scratch, &input).await;
            ctx.store.delete_job(&scratch)?;
            Ok(Json(result?))
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FullPipelineRequest {
    #[serde(flatten)]
    video: VideoSource,
    audio_base64: Option<String>,
    audio_url: Option<String>,
    #[serde(default = "default_volume")]
    audio_volume: f64,
    /// Inline SRT text, burned with default styling.
    subtitles: Option<String>,
    background_music_url: Option<String>,
    #[serde(default = "default_music_volume")]
    music_volume: f64,
    platform: Option<Platform>,
    #[serde(default)]
    normalize: bool,
    job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub job_id: String,
    pub status: PipelineStatus,
    pub steps: Vec<serde_json::Value>,
    pub output_url: Option<String>,
    pub file_size: Option<u64>,
}

pub async fn full_pipeline(
    State(ctx): State<AppContext>,
    Json(req): Json<FullPipelineRequest>,
) -> Result<Response, AppError> {
    let target = target_job_id(req.job_id.as_deref(), &req.video);

    let mut pipeline_req = PipelineRequest::new(req.video.into_input()?);
    pipeline_req.audio = match (req.audio_base64, req.audio_url) {
        (Some(data), _) => Some(InputRef::Base64(data)),
        (None, Some(url)) => Some(InputRef::Url(url)),
        (None, None) => None,
    };
    pipeline_req.audio_params = MergeParams {
        volume: req.audio_volume,
    };
    pipeline_req.subtitles = req.subtitles.map(InputRef::Text);
    pipeline_req.music = req.background_music_url.map(InputRef::Url);
    pipeline_req.music_params = MusicParams {
        music_volume: req.music_volume,
        ..Default::default()
    };
    pipeline_req.platform = req.platform;
    pipeline_req.normalize = req.normalize;

    let job = ctx.store.create_job(target.as_deref())?;
    match ctx.pipeline.run(&job, &pipeline_req).await {
        Ok(outcome) => {
            let response = PipelineResponse {
                job_id: job.to_string(),
                status: PipelineStatus::Succeeded,
                steps: outcome
                    .steps
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "step": s.step.name(),
                            "artifact": s.artifact,
                        })
                    })
                    .collect(),
                output_url: Some(format!(
                    "/download/{}/{}",
                    job, outcome.final_artifact.filename
                )),
                file_size: Some(outcome.final_artifact.size),
            };
            Ok(Json(response).into_response())
        }
        Err(failure) => {
            // Fail-fast: report the failing step and everything produced
            // before it; intermediates stay in the job for inspection.
            let status = StatusCode::from_u16(failure.error.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            tracing::error!(
                job_id = %job,
                step = failure.step.name(),
                error = %failure.error,
                "Pipeline failed"
            );
            let body = Json(serde_json::json!({
                "job_id": job.to_string(),
                "status": PipelineStatus::Failed {
                    step: failure.step.name().to_string(),
                },
                "error": failure.error.to_string(),
                "code": failure.error.code(),
                "artifacts": failure
                    .completed
                    .iter()
                    .map(|s| s.artifact.clone())
                    .collect::<Vec<_>>(),
            }));
            Ok((status, body).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact access and lifecycle
// ---------------------------------------------------------------------------

pub async fn download(
    State(ctx): State<AppContext>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let job = JobId::parse(&job_id)?;
    let path = ctx.store.artifact_path(&job, &filename)?;
    let artifact = ctx.store.describe(&job, &filename)?;

    let file = tokio::fs::File::open(&path).await.map_err(Error::from)?;
    let stream = ReaderStream::new(file);
    let body = axum::body::Body::from_stream(stream);

    let content_type = MediaKind::from_filename(&filename).content_type(&filename);
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_LENGTH, artifact.size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, body).into_response())
}

pub async fn list_artifacts(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<ArtifactRef>>, AppError> {
    let job = JobId::parse(&job_id)?;
    Ok(Json(ctx.store.list(&job)?))
}

pub async fn cleanup(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = JobId::parse(&job_id)?;
    // Idempotent: deleting a job that never existed is still a success.
    ctx.store.delete_job(&job)?;
    Ok(Json(serde_json::json!({ "deleted": job_id })))
}

pub async fn cleanup_all(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = ctx.store.delete_all()?;
    Ok(Json(serde_json::json!({ "deleted_jobs": deleted })))
}
