//! Composite pipeline orchestration.
//!
//! Runs the full publishing flow against one job: materialize the source,
//! then conditionally merge narration, mix background music, burn subtitles,
//! resize for a platform, and loudness-normalize. Each executed step leaves
//! a numbered artifact (`01_source.mp4`, `02_merged.mp4`, ...) and the last
//! output is additionally copied to `final.mp4`.
//!
//! The run is fail-fast: the first failing step aborts the pipeline, and the
//! response reports that step together with everything produced before it.
//! Intermediates are never deleted on failure; they stay in the job for
//! inspection until the reaper reclaims it.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ops::{
    Executor, MergeParams, MusicParams, NormalizeParams, Operation, Platform, ResizeParams,
    SubtitleParams,
};
use crate::resolve::InputRef;
use crate::store::{ArtifactRef, ArtifactStore, JobId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Everything one pipeline run may be asked to do. Only `source` is
/// mandatory; each optional input switches its step on.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: InputRef,
    /// Narration track merged over the video.
    pub audio: Option<InputRef>,
    pub audio_params: MergeParams,
    /// Background music mixed under the (merged) audio.
    pub music: Option<InputRef>,
    pub music_params: MusicParams,
    /// Subtitles burned into the frames.
    pub subtitles: Option<InputRef>,
    pub subtitle_params: SubtitleParams,
    /// Target platform resize.
    pub platform: Option<Platform>,
    /// Two-pass loudness normalization as the last step.
    pub normalize: bool,
    pub normalize_params: NormalizeParams,
}

impl PipelineRequest {
    pub fn new(source: InputRef) -> Self {
        Self {
            source,
            audio: None,
            audio_params: MergeParams::default(),
            music: None,
            music_params: MusicParams::default(),
            subtitles: None,
            subtitle_params: SubtitleParams::default(),
            platform: None,
            normalize: false,
            normalize_params: NormalizeParams::default(),
        }
    }
}

/// The steps a pipeline run can consist of, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Fetch,
    MergeAudio,
    BackgroundMusic,
    Subtitles,
    Resize,
    Normalize,
    Finalize,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::MergeAudio => "merge_audio",
            Step::BackgroundMusic => "background_music",
            Step::Subtitles => "subtitles",
            Step::Resize => "resize",
            Step::Normalize => "normalize",
            Step::Finalize => "finalize",
        }
    }

    /// Suffix for the numbered artifact this step writes.
    fn output_suffix(&self) -> &'static str {
        match self {
            Step::Fetch => "source.mp4",
            Step::MergeAudio => "merged.mp4",
            Step::BackgroundMusic => "with_music.mp4",
            Step::Subtitles => "subtitled.mp4",
            Step::Resize => "resized.mp4",
            Step::Normalize => "normalized.mp4",
            Step::Finalize => "final.mp4",
        }
    }
}

/// The steps a request will run, in order. Pure so it is testable without
/// touching ffmpeg or the network.
pub fn plan(request: &PipelineRequest) -> Vec<Step> {
    let mut steps = Vec::new();
    // A source already in the local store is used in place; anything else
    // must be materialized first.
    if !matches!(request.source, InputRef::Artifact { .. }) {
        steps.push(Step::Fetch);
    }
    if request.audio.is_some() {
        steps.push(Step::MergeAudio);
    }
    if request.music.is_some() {
        steps.push(Step::BackgroundMusic);
    }
    if request.subtitles.is_some() {
        steps.push(Step::Subtitles);
    }
    if request.platform.is_some() {
        steps.push(Step::Resize);
    }
    if request.normalize {
        steps.push(Step::Normalize);
    }
    steps.push(Step::Finalize);
    steps
}

/// Where a pipeline run currently stands. Serialized into responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running { step: String },
    Succeeded,
    Failed { step: String },
}

/// A successful run: every step in order with the artifact it produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub job_id: JobId,
    pub steps: Vec<CompletedStep>,
    pub final_artifact: ArtifactRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedStep {
    pub step: Step,
    pub artifact: String,
}

/// A failed run: which step broke, why, and what had been produced.
#[derive(Debug)]
pub struct PipelineFailure {
    pub step: Step,
    pub error: Error,
    pub completed: Vec<CompletedStep>,
}

/// Orchestrates pipeline runs over the executor.
pub struct Pipeline {
    store: ArtifactStore,
    executor: Arc<Executor>,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(store: ArtifactStore, executor: Arc<Executor>, config: &Config) -> Self {
        Self {
            store,
            executor,
            timeout: Duration::from_secs(config.ffmpeg.pipeline_timeout_secs),
        }
    }

    /// Run the full pipeline for `job` under the overall wall-clock budget.
    ///
    /// The budget is enforced per step against the time remaining, so a
    /// timeout failure names the step that was actually in flight and keeps
    /// the artifacts of the steps that finished before it.
    pub async fn run(
        &self,
        job: &JobId,
        request: &PipelineRequest,
    ) -> std::result::Result<PipelineOutcome, PipelineFailure> {
        let started = std::time::Instant::now();
        let steps = plan(request);
        tracing::info!(job_id = %job, steps = steps.len(), "Starting pipeline");

        let mut completed: Vec<CompletedStep> = Vec::new();
        // The rolling input: each step consumes the previous step's output.
        let mut current = request.source.clone();
        let mut index = 0usize;

        let mut final_artifact = None;
        for step in steps {
            index += 1;
            tracing::info!(job_id = %job, step = step.name(), index, "Pipeline step");

            let timed_out = || PipelineFailure {
                step,
                error: Error::Timeout {
                    op: "pipeline".to_string(),
                    secs: self.timeout.as_secs(),
                },
                completed: completed.clone(),
            };
            let remaining = self
                .timeout
                .checked_sub(started.elapsed())
                .filter(|d| !d.is_zero())
                .ok_or_else(|| timed_out())?;

            let result = tokio::time::timeout(
                remaining,
                self.run_step(job, request, step, &current, index),
            )
            .await
            .map_err(|_| timed_out())?
            .map_err(|error| PipelineFailure {
                step,
                error,
                completed: completed.clone(),
            })?;

            completed.push(CompletedStep {
                step,
                artifact: result.filename.clone(),
            });
            current = InputRef::Artifact {
                job_id: job.clone(),
                filename: Some(result.filename.clone()),
            };
            final_artifact = Some(result);
        }

        // The loop always runs Finalize, so an artifact is always present.
        let final_artifact = final_artifact.ok_or_else(|| PipelineFailure {
            step: Step::Finalize,
            error: Error::Internal("pipeline produced no artifact".to_string()),
            completed: completed.clone(),
        })?;

        tracing::info!(
            job_id = %job,
            artifact = %final_artifact.filename,
            "Pipeline complete"
        );
        Ok(PipelineOutcome {
            job_id: job.clone(),
            steps: completed,
            final_artifact,
        })
    }

    async fn run_step(
        &self,
        job: &JobId,
        request: &PipelineRequest,
        step: Step,
        current: &InputRef,
        index: usize,
    ) -> Result<ArtifactRef> {
        let output_name = match step {
            Step::Finalize => step.output_suffix().to_string(),
            _ => format!("{index:02}_{}", step.output_suffix()),
        };

        match step {
            Step::Fetch => {
                // Materialize the remote/inline source as the first artifact.
                self.executor
                    .resolver()
                    .resolve(job, &output_name, current)
                    .await?;
                self.store.describe(job, &output_name)
            }
            Step::MergeAudio => {
                let op = Operation::Merge {
                    video: current.clone(),
                    audio: request.audio.clone().ok_or_else(|| {
                        Error::Internal("merge step planned without audio".to_string())
                    })?,
                    params: request.audio_params.clone(),
                };
                self.executor.execute_as(job, &op, &output_name).await
            }
            Step::BackgroundMusic => {
                let op = Operation::BackgroundMusic {
                    video: current.clone(),
                    music: request.music.clone().ok_or_else(|| {
                        Error::Internal("music step planned without music".to_string())
                    })?,
                    params: request.music_params.clone(),
                };
                self.executor.execute_as(job, &op, &output_name).await
            }
            Step::Subtitles => {
                let op = Operation::Subtitles {
                    video: current.clone(),
                    subtitles: request.subtitles.clone().ok_or_else(|| {
                        Error::Internal("subtitle step planned without subtitles".to_string())
                    })?,
                    params: request.subtitle_params.clone(),
                };
                self.executor.execute_as(job, &op, &output_name).await
            }
            Step::Resize => {
                let op = Operation::Resize {
                    video: current.clone(),
                    params: ResizeParams {
                        preset: request.platform,
                        ..Default::default()
                    },
                };
                self.executor.execute_as(job, &op, &output_name).await
            }
            Step::Normalize => {
                let op = Operation::Normalize {
                    video: current.clone(),
                    params: request.normalize_params.clone(),
                };
                self.executor.execute_as(job, &op, &output_name).await
            }
            Step::Finalize => self.finalize(job, current, &output_name).await,
        }
    }

    /// Copy the last step's output to the stable `final.mp4` name.
    async fn finalize(&self, job: &JobId, current: &InputRef, name: &str) -> Result<ArtifactRef> {
        // `current` is always a local artifact at this point, so the
        // destination name is never used for materialization.
        let source = self
            .executor
            .resolver()
            .resolve(job, name, current)
            .await?;
        let staged = self.store.stage(job, name)?;
        std::fs::copy(&source, staged.path())?;
        self.store.commit(job, staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_request() -> PipelineRequest {
        PipelineRequest::new(InputRef::Url("http://example.com/v.mp4".into()))
    }

    #[test]
    fn minimal_plan_is_fetch_then_finalize() {
        let steps = plan(&remote_request());
        assert_eq!(steps, vec![Step::Fetch, Step::Finalize]);
    }

    #[test]
    fn local_source_skips_fetch() {
        let request = PipelineRequest::new(InputRef::Artifact {
            job_id: JobId::parse("abc123").unwrap(),
            filename: None,
        });
        let steps = plan(&request);
        assert_eq!(steps, vec![Step::Finalize]);
    }

    #[test]
    fn full_plan_runs_in_fixed_order() {
        let mut request = remote_request();
        request.audio = Some(InputRef::Base64("AAAA".into()));
        request.music = Some(InputRef::Url("http://example.com/m.mp3".into()));
        request.subtitles = Some(InputRef::Text("1\n00:00:00,000 --> 00:00:01,000\nHi\n".into()));
        request.platform = Some(Platform::YoutubeShorts);
        request.normalize = true;

        let steps = plan(&request);
        assert_eq!(
            steps,
            vec![
                Step::Fetch,
                Step::MergeAudio,
                Step::BackgroundMusic,
                Step::Subtitles,
                Step::Resize,
                Step::Normalize,
                Step::Finalize,
            ]
        );
    }

    #[test]
    fn optional_steps_toggle_independently() {
        let mut request = remote_request();
        request.platform = Some(Platform::Tiktok);
        assert_eq!(
            plan(&request),
            vec![Step::Fetch, Step::Resize, Step::Finalize]
        );

        let mut request = remote_request();
        request.normalize = true;
        assert_eq!(
            plan(&request),
            vec![Step::Fetch, Step::Normalize, Step::Finalize]
        );
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(Step::Fetch.name(), "fetch");
        assert_eq!(Step::BackgroundMusic.name(), "background_music");
        assert_eq!(Step::Finalize.name(), "finalize");
    }

    #[test]
    fn status_serializes_with_step_names() {
        let status = PipelineStatus::Failed {
            step: "subtitles".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["step"], "subtitles");
    }
}
