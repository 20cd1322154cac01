//! Upload orchestration.
//!
//! Each file goes through validate, convert, optimize, upload and record.
//! A file that fails any step is reported in its [`FileOutcome`]; nothing
//! escapes [`Orchestrator::submit_batch`] as an error.

use crate::collaborators::{DocumentConverter, PdfOptimizer};
use crate::error::{IngestError, IngestResult};
use crate::provision::BucketProvisioner;
use crate::task::{BatchReport, FileOutcome, SourceFile, UploadStatus, UploadTask};
use bytes::Bytes;
use docket_core::config::IngestConfig;
use docket_core::document::{mime_for, pdf_file_name};
use docket_core::{DocumentKind, PDF_MIME, StorageKey, validate_upload};
use docket_metadata::{FileRecordRepo, FileRecordRow};
use docket_storage::{ObjectStore, Storage, StorageResult};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Who a batch belongs to.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub parent_reference: String,
    pub creator_id: String,
}

impl UploadContext {
    pub fn new(parent_reference: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            parent_reference: parent_reference.into(),
            creator_id: creator_id.into(),
        }
    }
}

/// The bytes that will actually be stored for one file.
struct Artifact {
    data: Bytes,
    kind: DocumentKind,
    mime_type: String,
    display_name: String,
}

pub struct Orchestrator {
    config: IngestConfig,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn FileRecordRepo>,
    provisioner: Arc<BucketProvisioner>,
    converter: Option<Arc<dyn DocumentConverter>>,
    optimizer: Option<Arc<dyn PdfOptimizer>>,
}

impl Orchestrator {
    pub fn new(config: IngestConfig, storage: &Storage, records: Arc<dyn FileRecordRepo>) -> Self {
        let provisioner = Arc::new(BucketProvisioner::new(
            storage.buckets.clone(),
            storage.objects.bucket(),
            config.provision_timeout(),
            config.provision_poll_interval(),
        ));
        Self {
            config,
            objects: storage.objects.clone(),
            records,
            provisioner,
            converter: None,
            optimizer: None,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn PdfOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn provisioner(&self) -> &Arc<BucketProvisioner> {
        &self.provisioner
    }

    /// Process every file concurrently. One file failing does not affect the others.
    pub async fn submit_batch(&self, ctx: &UploadContext, files: Vec<SourceFile>) -> BatchReport {
        let total = files.len();
        let outcomes =
            futures::future::join_all(files.into_iter().map(|file| self.process_file(ctx, file)))
                .await;
        let report = BatchReport { outcomes };

        tracing::info!(
            parent = %ctx.parent_reference,
            total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Upload batch finished: {}",
            report.summary()
        );
        report
    }

    /// Run one file through the pipeline.
    #[instrument(skip(self, ctx, file), fields(file = %file.name, size = file.size()))]
    pub async fn process_file(&self, ctx: &UploadContext, file: SourceFile) -> FileOutcome {
        let mut task = UploadTask::new(&file);
        let result = self.run(ctx, file, &mut task).await;

        match &result {
            Ok(record) => {
                task.status = UploadStatus::Persisted;
                tracing::debug!(key = %record.storage_key, "File stored and recorded");
            }
            Err(e) => {
                task.status = UploadStatus::Failed;
                task.error = Some(e.to_string());
                match e.orphaned_key() {
                    Some(key) => {
                        tracing::error!(key, error = %e, "Stored blob has no record")
                    }
                    None => tracing::warn!(code = e.code(), error = %e, "File upload failed"),
                }
            }
        }

        FileOutcome { task, result }
    }

    async fn run(
        &self,
        ctx: &UploadContext,
        file: SourceFile,
        task: &mut UploadTask,
    ) -> IngestResult<FileRecordRow> {
        let kind = validate_upload(
            &file.name,
            file.mime_type.as_deref(),
            file.size(),
            self.config.max_file_bytes,
        )?;

        let base_name = base_name(&file.name).to_string();
        let mut artifact = Artifact {
            mime_type: file
                .mime_type
                .clone()
                .unwrap_or_else(|| mime_for(kind, &base_name).to_string()),
            data: file.data,
            kind,
            display_name: base_name,
        };

        if artifact.kind == DocumentKind::WordDocument
            && let Some(converter) = &self.converter
        {
            task.status = UploadStatus::Converting;
            let converted = converter
                .convert_to_pdf(
                    &artifact.display_name,
                    &artifact.mime_type,
                    artifact.data.clone(),
                )
                .await;
            match converted {
                Ok(pdf) => {
                    task.was_converted = true;
                    task.artifact_size = Some(pdf.len() as u64);
                    artifact = Artifact {
                        data: pdf,
                        kind: DocumentKind::Pdf,
                        mime_type: PDF_MIME.to_string(),
                        display_name: pdf_file_name(&artifact.display_name),
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Conversion failed, storing original document");
                }
            }
        }

        if artifact.kind == DocumentKind::Pdf
            && let Some(optimizer) = &self.optimizer
        {
            task.status = UploadStatus::Converting;
            let optimized = optimizer
                .optimize(&artifact.display_name, artifact.data.clone())
                .await;
            match optimized {
                Ok(optimized) if optimized != artifact.data => {
                    task.was_optimized = true;
                    task.artifact_size = Some(optimized.len() as u64);
                    artifact.data = optimized;
                }
                Ok(_) => tracing::debug!("Optimizer returned identical bytes"),
                Err(e) => {
                    tracing::warn!(error = %e, "PDF optimization failed, storing unoptimized file");
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        let key = StorageKey::build(
            &self.config.namespace,
            &ctx.parent_reference,
            now,
            &task.discriminator(),
            &artifact.display_name,
        )
        .into_string();
        task.storage_key = Some(key.clone());

        task.status = UploadStatus::Uploading;
        self.upload(&key, &artifact).await?;

        let url = self.objects.public_url(&key);
        task.public_url = Some(url.clone());

        let record = FileRecordRow {
            id: Uuid::new_v4(),
            parent_reference: ctx.parent_reference.clone(),
            display_name: artifact.display_name,
            url,
            storage_key: key.clone(),
            size: i64::try_from(artifact.data.len()).unwrap_or(i64::MAX),
            mime_type: artifact.mime_type,
            creator_id: ctx.creator_id.clone(),
            created_at: now,
        };

        self.records
            .insert_file_record(&record)
            .await
            .map_err(|source| IngestError::MetadataPersist { key, source })?;

        Ok(record)
    }

    /// Upsert the artifact, provisioning the bucket and retrying once if it is missing.
    async fn upload(&self, key: &str, artifact: &Artifact) -> IngestResult<()> {
        match self.put_artifact(key, artifact).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_bucket_missing() => {
                tracing::warn!(
                    bucket = self.provisioner.bucket(),
                    "Bucket missing, provisioning before retry"
                );
                self.provisioner.invalidate();
                self.provisioner.ensure().await?;
                self.put_artifact(key, artifact)
                    .await
                    .map_err(|source| IngestError::Upload {
                        key: key.to_string(),
                        source,
                    })
            }
            Err(source) => Err(IngestError::Upload {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn put_artifact(&self, key: &str, artifact: &Artifact) -> StorageResult<()> {
        self.objects
            .put(key, artifact.data.clone(), &artifact.mime_type)
            .await
    }
}

/// Last path component of a client-supplied name.
fn base_name(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() { name } else { base }
}
