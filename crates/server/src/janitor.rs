//! Background removal of stale staging entries.
//!
//! Inline cleanup in the converter handles the normal path. The janitor covers
//! what a crash or an aborted request leaves behind.

use crate::metrics::STAGING_FILES_REMOVED;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: u64,
    pub removed: u64,
    pub errors: u64,
}

pub struct Janitor {
    staging_dir: PathBuf,
    max_age: Duration,
}

impl Janitor {
    pub fn new(staging_dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            max_age,
        }
    }

    /// Remove every entry whose mtime is older than `max_age` relative to `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepStats {
        let mut stats = SweepStats::default();

        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return stats,
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(
                    staging_dir = %self.staging_dir.display(),
                    error = %e,
                    "Failed to list staging directory"
                );
                return stats;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(error = %e, "Failed to read staging directory entry");
                    break;
                }
            };
            stats.scanned += 1;
            let path = entry.path();

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Failed to stat staged entry");
                    continue;
                }
            };

            // Entries with an mtime in the future count as fresh.
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            let removal = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match removal {
                Ok(()) => {
                    stats.removed += 1;
                    tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale staged entry");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale staged entry");
                }
            }
        }

        STAGING_FILES_REMOVED.inc_by(stats.removed);
        stats
    }

    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweep on a fixed interval for the life of the process.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let stats = self.sweep().await;
                if stats.removed > 0 || stats.errors > 0 {
                    tracing::info!(
                        scanned = stats.scanned,
                        removed = stats.removed,
                        errors = stats.errors,
                        "Staging sweep finished"
                    );
                }
            }
        })
    }
}
