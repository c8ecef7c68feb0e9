//! Background reclamation of expired job directories.
//!
//! Jobs are ephemeral and disk-backed; a periodic sweep deletes any job whose
//! newest file mtime is older than the retention window. An in-flight write
//! keeps refreshing the newest mtime, so a job being written to is never
//! reaped mid-write.

use super::{ArtifactStore, JobId};
use crate::error::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Reaper over an [`ArtifactStore`] with a fixed retention window.
#[derive(Clone)]
pub struct Reaper {
    store: ArtifactStore,
    retention: Duration,
}

impl Reaper {
    pub fn new(store: ArtifactStore, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Sweep once, deleting every expired job. Returns the number reaped.
    pub fn sweep(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut reaped = 0;

        for entry in std::fs::read_dir(self.store.root())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            // Only directories the store itself created are jobs; anything
            // else under the root is left alone.
            let job = match JobId::parse(&entry.file_name().to_string_lossy()) {
                Ok(job) => job,
                Err(_) => {
                    tracing::warn!(dir = %entry.path().display(), "Skipping non-job directory");
                    continue;
                }
            };

            let freshness = match newest_mtime(&entry.path()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(dir = %entry.path().display(), error = %e, "Skipping unreadable job dir");
                    continue;
                }
            };

            let expired = now
                .duration_since(freshness)
                .map(|age| age > self.retention)
                .unwrap_or(false);

            if expired {
                tracing::info!(job_id = %job, "Reaping expired job");
                if let Err(e) = self.store.delete_job(&job) {
                    tracing::warn!(job_id = %job, error = %e, "Failed to reap job");
                } else {
                    reaped += 1;
                }
            }
        }

        if reaped > 0 {
            tracing::debug!(reaped, "Reaper sweep complete");
        }
        Ok(reaped)
    }
}

/// The newest mtime among a directory and its files. Falls back to the
/// directory's own mtime for an empty job.
fn newest_mtime(dir: &Path) -> std::io::Result<SystemTime> {
    let mut newest = std::fs::metadata(dir)?.modified()?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let mtime = entry.metadata()?.modified()?;
        if mtime > newest {
            newest = mtime;
        }
    }
    Ok(newest)
}

/// Start a background task that periodically sweeps expired jobs.
pub fn start_reaper_task(reaper: Reaper, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let reaper = reaper.clone();
            // Sweep touches the filesystem; keep it off the async workers.
            let result = tokio::task::spawn_blocking(move || reaper.sweep()).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Reaper sweep failed"),
                Err(e) => tracing::warn!(error = %e, "Reaper task panicked"),
            }
        }
    })
}
