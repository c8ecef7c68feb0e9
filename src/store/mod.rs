//! Job-scoped artifact storage.
//!
//! Maps a job id to a directory of named files under one root. All writes are
//! atomic (temp name in the same directory, rename into place) so a concurrent
//! reader never observes a partial file. Caller-supplied job ids and artifact
//! names are validated so nothing escapes a job's own subdirectory.

pub mod reaper;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Maximum length of a job id.
const MAX_JOB_ID_LEN: usize = 64;

/// A validated job identifier. Uniquely determines the job's directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate a caller-supplied id. Only `[A-Za-z0-9_-]` is accepted, so a
    /// job id can never contain a path separator or dot sequence.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_JOB_ID_LEN {
            return Err(Error::InvalidJobId(s.to_string()));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidJobId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Generate a fresh random id (first 8 hex chars of a UUIDv4).
    pub fn generate() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self(id[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        JobId::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Broad media classification derived from an artifact's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Subtitle,
    Text,
}

impl MediaKind {
    /// Classify a filename by its extension.
    pub fn from_filename(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "mkv" | "mov" | "webm" | "avi" => MediaKind::Video,
            "mp3" | "aac" | "wav" | "m4a" | "ogg" | "flac" => MediaKind::Audio,
            "jpg" | "jpeg" | "png" | "webp" => MediaKind::Image,
            "srt" | "vtt" | "ass" => MediaKind::Subtitle,
            _ => MediaKind::Text,
        }
    }

    /// MIME type served for downloads of this kind.
    pub fn content_type(&self, name: &str) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => {
                if name.ends_with(".wav") {
                    "audio/wav"
                } else if name.ends_with(".aac") {
                    "audio/aac"
                } else {
                    "audio/mpeg"
                }
            }
            MediaKind::Image => {
                if name.ends_with(".png") {
                    "image/png"
                } else {
                    "image/jpeg"
                }
            }
            MediaKind::Subtitle | MediaKind::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Metadata for one immutable artifact within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub job_id: JobId,
    pub filename: String,
    pub kind: MediaKind,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Filesystem-backed store of per-job artifact directories.
///
/// An explicitly constructed instance holds the root path; there is no
/// process-wide singleton.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The root directory holding all job subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or reuse) a job directory.
    ///
    /// A supplied id is validated and reused if it already exists, so later
    /// operations can append artifacts to the same job. With no id a fresh
    /// random one is generated.
    pub fn create_job(&self, id: Option<&str>) -> Result<JobId> {
        let job = match id {
            Some(s) => JobId::parse(s)?,
            None => JobId::generate(),
        };
        std::fs::create_dir_all(self.job_dir(&job))?;
        Ok(job)
    }

    /// The directory backing a job. Not guaranteed to exist.
    pub fn job_dir(&self, job: &JobId) -> PathBuf {
        self.root.join(job.as_str())
    }

    /// Whether the job directory exists.
    pub fn job_exists(&self, job: &JobId) -> bool {
        self.job_dir(job).is_dir()
    }

    /// Write bytes as a named artifact, atomically.
    ///
    /// The data lands in a temp file in the job directory and is renamed into
    /// place, so readers never see a partial artifact. Re-writing an existing
    /// name replaces it (last writer wins).
    pub fn write(&self, job: &JobId, name: &str, bytes: &[u8]) -> Result<ArtifactRef> {
        validate_artifact_name(name)?;
        let dir = self.job_dir(job);
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(dir.join(name))
            .map_err(|e| Error::from(e.error))?;

        self.describe(job, name)
    }

    /// Reserve a staging path for an operation's output.
    ///
    /// ffmpeg writes to the staged path (a dot-prefixed sibling keeping the
    /// final extension, so container detection still works); [`Self::commit`]
    /// renames it into place. A failed operation leaves at most a hidden temp
    /// file, never a partial artifact under the final name.
    pub fn stage(&self, job: &JobId, name: &str) -> Result<StagedArtifact> {
        validate_artifact_name(name)?;
        let dir = self.job_dir(job);
        std::fs::create_dir_all(&dir)?;

        let nonce = &Uuid::new_v4().simple().to_string()[..8];
        let temp_path = dir.join(format!(".{nonce}.{name}"));
        Ok(StagedArtifact {
            temp_path,
            final_path: dir.join(name),
        })
    }

    /// Rename a staged output into place and describe the new artifact.
    pub fn commit(&self, job: &JobId, staged: StagedArtifact) -> Result<ArtifactRef> {
        if !staged.temp_path.exists() {
            return Err(Error::Internal(format!(
                "staged output missing: {}",
                staged.temp_path.display()
            )));
        }
        std::fs::rename(&staged.temp_path, &staged.final_path)?;
        let name = staged
            .final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.describe(job, &name)
    }

    /// Resolve an artifact to its path, failing `NotFound` if absent.
    pub fn artifact_path(&self, job: &JobId, name: &str) -> Result<PathBuf> {
        validate_artifact_name(name)?;
        let path = self.job_dir(job).join(name);
        if !path.is_file() {
            return Err(Error::not_found("artifact", format!("{job}/{name}")));
        }
        Ok(path)
    }

    /// Metadata for one artifact.
    pub fn describe(&self, job: &JobId, name: &str) -> Result<ArtifactRef> {
        let path = self.artifact_path(job, name)?;
        let meta = std::fs::metadata(&path)?;
        Ok(ArtifactRef {
            job_id: job.clone(),
            filename: name.to_string(),
            kind: MediaKind::from_filename(name),
            size: meta.len(),
            created: meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now()),
        })
    }

    /// List a job's artifacts, oldest first. Hidden staging files are skipped.
    pub fn list(&self, job: &JobId) -> Result<Vec<ArtifactRef>> {
        let dir = self.job_dir(job);
        if !dir.is_dir() {
            return Err(Error::not_found("job", job));
        }

        let mut artifacts = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type()?.is_file() {
                continue;
            }
            artifacts.push(self.describe(job, &name)?);
        }
        artifacts.sort_by(|a, b| a.created.cmp(&b.created).then(a.filename.cmp(&b.filename)));
        Ok(artifacts)
    }

    /// The most recently written artifact of a job.
    pub fn latest(&self, job: &JobId) -> Result<ArtifactRef> {
        self.list(job)?
            .pop()
            .ok_or_else(|| Error::not_found("artifact", job))
    }

    /// Delete a job directory and everything in it. Idempotent: deleting a
    /// missing job is not an error.
    pub fn delete_job(&self, job: &JobId) -> Result<()> {
        let dir = self.job_dir(job);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(job_id = %job, "Deleted job directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Administrative bulk removal of every job. Returns the count deleted.
    pub fn delete_all(&self) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())?;
                count += 1;
            }
        }
        tracing::info!(deleted = count, "Deleted all job directories");
        Ok(count)
    }
}

/// A reserved output location inside a job directory.
#[derive(Debug)]
pub struct StagedArtifact {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedArtifact {
    /// Where the operation should write its output.
    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}

/// Reject artifact names that could escape the job directory or collide with
/// staging files.
fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > 255
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(Error::invalid_parameter(format!(
            "invalid artifact name: {name:?}"
        )));
    }
    Ok(())
}
