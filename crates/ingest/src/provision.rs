//! Bucket self-provisioning.
//!
//! A successful create call does not mean the bucket is usable yet on
//! eventually consistent stores. `ensure` therefore polls the bucket listing
//! with exponential backoff until the bucket shows up or the configured
//! timeout passes.

use crate::error::{IngestError, IngestResult};
use docket_storage::{BucketAdmin, BucketCreation};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Snapshot of what the provisioner knows about its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    pub exists: bool,
    pub provision_attempts: u32,
}

pub struct BucketProvisioner {
    admin: Arc<dyn BucketAdmin>,
    bucket: String,
    exists: AtomicBool,
    attempts: AtomicU32,
    timeout: Duration,
    poll_interval: Duration,
    // Serializes provisioning so a batch hitting a missing bucket creates it once.
    provisioning: Mutex<()>,
}

impl BucketProvisioner {
    pub fn new(
        admin: Arc<dyn BucketAdmin>,
        bucket: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            admin,
            bucket: bucket.into(),
            exists: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            timeout,
            poll_interval,
            provisioning: Mutex::new(()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn state(&self) -> BucketState {
        BucketState {
            exists: self.exists.load(Ordering::Acquire),
            provision_attempts: self.attempts.load(Ordering::Relaxed),
        }
    }

    /// Forget that the bucket exists. Called when the store reports it missing.
    pub fn invalidate(&self) {
        self.exists.store(false, Ordering::Release);
    }

    /// Make sure the bucket exists, creating it if needed.
    pub async fn ensure(&self) -> IngestResult<()> {
        if self.exists.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.provisioning.lock().await;
        // Another task may have finished provisioning while we waited.
        if self.exists.load(Ordering::Acquire) {
            return Ok(());
        }

        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(bucket = %self.bucket, attempt, "Checking storage bucket");

        if self.is_listed().await? {
            self.exists.store(true, Ordering::Release);
            return Ok(());
        }

        match self.admin.create_bucket(&self.bucket).await {
            Ok(BucketCreation::Created) => {
                tracing::info!(bucket = %self.bucket, "Created storage bucket");
            }
            Ok(BucketCreation::AlreadyExists) => {
                tracing::info!(bucket = %self.bucket, "Bucket reported as already existing, verifying");
            }
            Err(e) => {
                tracing::error!(bucket = %self.bucket, error = %e, "Bucket creation failed");
                return Err(IngestError::StorageUnavailable(format!(
                    "failed to create bucket {}: {e}",
                    self.bucket
                )));
            }
        }

        self.wait_until_listed().await?;
        self.exists.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_listed(&self) -> IngestResult<bool> {
        let buckets = self.admin.list_buckets().await.map_err(|e| {
            IngestError::StorageUnavailable(format!("failed to list buckets: {e}"))
        })?;
        Ok(buckets.iter().any(|b| b == &self.bucket))
    }

    async fn wait_until_listed(&self) -> IngestResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut delay = self.poll_interval;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.is_listed().await {
                Ok(true) => {
                    tracing::debug!(bucket = %self.bucket, polls, "Bucket is visible");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(bucket = %self.bucket, error = %e, "Bucket listing failed while waiting");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(IngestError::StorageUnavailable(format!(
                    "bucket {} not visible after {}ms ({polls} polls)",
                    self.bucket,
                    self.timeout.as_millis()
                )));
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_POLL_INTERVAL);
        }
    }
}
