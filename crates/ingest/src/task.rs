//! Per-file task state and batch results.

use crate::error::IngestError;
use bytes::Bytes;
use docket_metadata::FileRecordRow;
use std::path::Path;
use uuid::Uuid;

/// A file handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            data: data.into(),
        }
    }

    /// Read a file from disk. The type is classified from the extension later.
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, None, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Converting,
    Uploading,
    Persisted,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Converting => "converting",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Persisted => "persisted",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Persisted | UploadStatus::Failed)
    }
}

/// Progress of one file through the pipeline.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: Uuid,
    pub source_name: String,
    pub source_size: u64,
    pub source_mime_type: Option<String>,
    /// Size of the artifact that replaced the source, if any.
    pub artifact_size: Option<u64>,
    pub was_converted: bool,
    pub was_optimized: bool,
    pub storage_key: Option<String>,
    pub public_url: Option<String>,
    pub status: UploadStatus,
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(source: &SourceFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source.name.clone(),
            source_size: source.size(),
            source_mime_type: source.mime_type.clone(),
            artifact_size: None,
            was_converted: false,
            was_optimized: false,
            storage_key: None,
            public_url: None,
            status: UploadStatus::Pending,
            error: None,
        }
    }

    /// Short per-task discriminator used in storage keys.
    pub fn discriminator(&self) -> String {
        let mut simple = self.id.simple().to_string();
        simple.truncate(8);
        simple
    }
}

/// Terminal result for one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub task: UploadTask,
    pub result: Result<FileRecordRow, IngestError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-file outcomes of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecordRow> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&UploadTask, &IngestError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.task, e)))
    }

    /// "X of N succeeded".
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.total())
    }
}
