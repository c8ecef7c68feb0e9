//! Input resolution.
//!
//! Turns a request's input reference (an existing artifact, a remote URL, an
//! upstream render job, or an inline payload) into a readable local file
//! inside the target job's directory. Remote fetches are bounded in both
//! size and time; fetched and decoded bytes land as normal artifacts so the
//! job lifecycle owns their cleanup.

use crate::config::{Config, FetchConfig};
use crate::error::{Error, Result};
use crate::store::{ArtifactStore, JobId};
use base64::Engine;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// One input reference from a request.
#[derive(Debug, Clone)]
pub enum InputRef {
    /// An artifact already in this service's store.
    Artifact {
        job_id: JobId,
        /// Specific artifact; defaults to the job's newest artifact.
        filename: Option<String>,
    },
    /// A remote file fetched over HTTP.
    Url(String),
    /// A video rendered by the upstream renderer, addressed by its job id.
    RenderJob(String),
    /// Inline base64-encoded bytes.
    Base64(String),
    /// Inline text content (subtitles).
    Text(String),
}

/// Resolves [`InputRef`]s to local files.
pub struct Resolver {
    store: ArtifactStore,
    client: reqwest::Client,
    renderer_base_url: String,
    max_bytes: u64,
    timeout: Duration,
}

impl Resolver {
    pub fn new(store: ArtifactStore, config: &Config) -> Self {
        Self::with_fetch_config(store, &config.fetch, config.renderer.base_url.clone())
    }

    pub fn with_fetch_config(
        store: ArtifactStore,
        fetch: &FetchConfig,
        renderer_base_url: String,
    ) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            renderer_base_url: renderer_base_url.trim_end_matches('/').to_string(),
            max_bytes: fetch.max_bytes,
            timeout: Duration::from_secs(fetch.timeout_secs),
        }
    }

    /// Resolve one reference into a local path.
    ///
    /// Non-artifact references are materialized as `dest_name` under `job`;
    /// artifact references resolve in place. Fails fast on the first error,
    /// leaving any already-materialized inputs to normal job cleanup.
    pub async fn resolve(&self, job: &JobId, dest_name: &str, input: &InputRef) -> Result<PathBuf> {
        match input {
            InputRef::Artifact { job_id, filename } => {
                if !self.store.job_exists(job_id) {
                    return Err(Error::not_found("job", job_id));
                }
                match filename {
                    Some(name) => self.store.artifact_path(job_id, name),
                    None => {
                        let latest = self.store.latest(job_id)?;
                        self.store.artifact_path(job_id, &latest.filename)
                    }
                }
            }
            InputRef::Url(url) => self.fetch(job, dest_name, url).await,
            InputRef::RenderJob(id) => {
                let url = self.render_url(id)?;
                self.fetch(job, dest_name, &url).await
            }
            InputRef::Base64(data) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| Error::Decode(format!("malformed base64 payload: {e}")))?;
                self.store.write(job, dest_name, &bytes)?;
                self.store.artifact_path(job, dest_name)
            }
            InputRef::Text(text) => {
                self.store.write(job, dest_name, text.as_bytes())?;
                self.store.artifact_path(job, dest_name)
            }
        }
    }

    /// URL the upstream renderer serves a finished video from.
    fn render_url(&self, render_job_id: &str) -> Result<String> {
        if render_job_id.is_empty()
            || !render_job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::invalid_parameter(format!(
                "invalid render job id: {render_job_id:?}"
            )));
        }
        Ok(format!("{}/video/{}", self.renderer_base_url, render_job_id))
    }

    /// Download a URL into the job, streaming with a byte cap.
    async fn fetch(&self, job: &JobId, dest_name: &str, url: &str) -> Result<PathBuf> {
        tracing::info!(job_id = %job, url, "Fetching remote input");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Fetch(format!("timed out fetching {url}"))
                } else {
                    Error::Fetch(format!("request to {url} failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{url} returned {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(Error::Fetch(format!(
                    "{url} is {len} bytes, exceeds limit of {}",
                    self.max_bytes
                )));
            }
        }

        // Stream to the staged path, counting bytes; the declared length can
        // lie (or be absent), so the cap is enforced on the wire too.
        let staged = self.store.stage(job, dest_name)?;
        let mut file = std::fs::File::create(staged.path())?;
        let mut total: u64 = 0;
        let mut response = response;
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Fetch(format!("timed out fetching {url}"))
                } else {
                    Error::Fetch(format!("download from {url} failed: {e}"))
                }
            })?;
            let Some(chunk) = chunk else { break };
            total += chunk.len() as u64;
            if total > self.max_bytes {
                drop(file);
                let _ = std::fs::remove_file(staged.path());
                return Err(Error::Fetch(format!(
                    "{url} exceeded download limit of {} bytes",
                    self.max_bytes
                )));
            }
            file.write_all(&chunk)?;
        }
        file.flush()?;
        drop(file);

        self.store.commit(job, staged)?;
        tracing::debug!(job_id = %job, dest_name, bytes = total, "Fetched remote input");
        self.store.artifact_path(job, dest_name)
    }
}
