//! Orphan reconciliation.
//!
//! A blob stored without a matching file record (the record insert failed
//! after the upload succeeded) is invisible to users. The sweep finds such
//! blobs under the namespace and deletes them once they are older than the
//! grace period, which keeps in-flight uploads safe.

use crate::error::{IngestError, IngestResult};
use docket_core::StorageKey;
use docket_metadata::FileRecordRepo;
use docket_storage::ObjectStore;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub scanned: u64,
    pub orphaned: u64,
    pub removed: u64,
    pub skipped_recent: u64,
    pub errors: u64,
}

pub struct Reconciler {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn FileRecordRepo>,
    prefix: String,
    grace: Duration,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn FileRecordRepo>,
        namespace: &str,
        grace: Duration,
    ) -> Self {
        Self {
            objects,
            records,
            prefix: StorageKey::namespace_prefix(namespace),
            grace,
            dry_run: false,
        }
    }

    /// Report orphans without deleting them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn sweep(&self) -> IngestResult<ReconcileStats> {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_at(&self, now: OffsetDateTime) -> IngestResult<ReconcileStats> {
        let keys = self.objects.list(&self.prefix).await.map_err(|e| {
            IngestError::StorageUnavailable(format!("failed to list {}: {e}", self.prefix))
        })?;

        let mut stats = ReconcileStats::default();
        for key in keys {
            stats.scanned += 1;

            match self.records.file_record_exists_for_key(&key).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Record lookup failed, skipping");
                    stats.errors += 1;
                    continue;
                }
            }

            let last_modified = match self.objects.head(&key).await {
                Ok(meta) => meta.last_modified,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to read object metadata");
                    stats.errors += 1;
                    continue;
                }
            };
            // Unknown age is treated as recent.
            let old_enough = last_modified.is_some_and(|at| now - at >= self.grace);
            if !old_enough {
                stats.skipped_recent += 1;
                continue;
            }

            stats.orphaned += 1;
            if self.dry_run {
                tracing::info!(key = %key, "Orphaned blob (dry run)");
                continue;
            }

            match self.objects.delete(&key).await {
                Ok(()) => {
                    tracing::info!(key = %key, "Removed orphaned blob");
                    stats.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to remove orphaned blob");
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            prefix = %self.prefix,
            scanned = stats.scanned,
            orphaned = stats.orphaned,
            removed = stats.removed,
            skipped_recent = stats.skipped_recent,
            errors = stats.errors,
            dry_run = self.dry_run,
            "Reconciliation sweep finished"
        );
        Ok(stats)
    }
}
