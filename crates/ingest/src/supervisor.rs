//! Background batch execution.
//!
//! Batches run on spawned tasks so the caller can return immediately. Every
//! batch reports through its ticket: a finished report, or the reason the
//! worker died. Panics are never swallowed.

use crate::pipeline::{Orchestrator, UploadContext};
use crate::task::{BatchReport, SourceFile};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

/// Why a batch produced no report.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("upload worker panicked: {0}")]
    Panicked(String),

    #[error("upload worker was cancelled")]
    Cancelled,

    #[error("upload worker exited without reporting")]
    Dropped,
}

impl From<JoinError> for SupervisorError {
    fn from(err: JoinError) -> Self {
        if !err.is_panic() {
            return SupervisorError::Cancelled;
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        SupervisorError::Panicked(message)
    }
}

/// Handle to a submitted batch.
#[derive(Debug)]
pub struct BatchTicket {
    pub id: Uuid,
    receiver: oneshot::Receiver<Result<BatchReport, SupervisorError>>,
}

impl BatchTicket {
    /// Wait for the batch to finish.
    pub async fn wait(self) -> Result<BatchReport, SupervisorError> {
        self.receiver
            .await
            .unwrap_or(Err(SupervisorError::Dropped))
    }
}

/// Runs upload batches on background tasks and tracks them until they finish.
pub struct UploadSupervisor {
    orchestrator: Arc<Orchestrator>,
    /// Map of batch id -> watcher task handle
    tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl UploadSupervisor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a batch in the background.
    pub async fn submit(&self, ctx: UploadContext, files: Vec<SourceFile>) -> BatchTicket {
        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        let file_count = files.len();

        // Held across the spawn so the watcher cannot deregister before it is registered.
        let mut tasks = self.tasks.lock().await;

        let orchestrator = self.orchestrator.clone();
        let worker =
            tokio::spawn(async move { orchestrator.submit_batch(&ctx, files).await });

        let registry = self.tasks.clone();
        let watcher = tokio::spawn(async move {
            let result = worker.await.map_err(SupervisorError::from);
            if let Err(e) = &result {
                tracing::error!(batch_id = %id, error = %e, "Upload batch failed without a report");
            }
            if sender.send(result).is_err() {
                tracing::debug!(batch_id = %id, "Batch ticket dropped before completion");
            }
            registry.lock().await.remove(&id);
        });

        tasks.insert(id, watcher);
        tracing::info!(batch_id = %id, files = file_count, "Upload batch submitted");

        BatchTicket { id, receiver }
    }

    /// Number of batches still running.
    pub async fn outstanding(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait until every submitted batch has finished.
    pub async fn drain(&self) {
        loop {
            // Take handles out so the mutex is not held while awaiting.
            let handles: Vec<_> = {
                let mut tasks = self.tasks.lock().await;
                tasks.drain().collect()
            };
            if handles.is_empty() {
                return;
            }
            for (id, handle) in handles {
                if let Err(e) = handle.await {
                    tracing::error!(batch_id = %id, error = %e, "Batch watcher failed");
                }
            }
        }
    }
}
