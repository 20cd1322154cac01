//! In-memory collaborators for orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use docket_core::config::IngestConfig;
use docket_ingest::{
    DocumentConverter, IngestError, IngestResult, Orchestrator, PdfOptimizer, SourceFile,
};
use docket_metadata::{FileRecordRepo, FileRecordRow, MetadataError, MetadataResult};
use docket_storage::{
    BucketAdmin, BucketCreation, ObjectMeta, ObjectStore, Storage, StorageError, StorageResult,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

pub const BUCKET: &str = "docs";

#[derive(Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub last_modified: OffsetDateTime,
}

/// Object store and bucket admin over a map.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    bucket_exists: AtomicBool,
    /// When set, create calls succeed but the bucket never becomes visible.
    create_is_noop: AtomicBool,
    fail_puts_containing: Mutex<Vec<String>>,
    pub puts: AtomicUsize,
    pub creates: AtomicUsize,
}

impl MemoryStore {
    pub fn new(bucket_exists: bool) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            bucket_exists: AtomicBool::new(bucket_exists),
            create_is_noop: AtomicBool::new(false),
            fail_puts_containing: Mutex::new(Vec::new()),
            puts: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
        }
    }

    pub fn remove_bucket(&self) {
        self.bucket_exists.store(false, Ordering::SeqCst);
    }

    pub fn never_provision(&self) {
        self.create_is_noop.store(true, Ordering::SeqCst);
    }

    /// Fail every put whose key contains `fragment`.
    pub fn fail_puts_containing(&self, fragment: &str) {
        self.fail_puts_containing
            .lock()
            .unwrap()
            .push(fragment.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert_at(&self, key: &str, data: &[u8], last_modified: OffsetDateTime) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                content_type: docket_core::PDF_MIME.to_string(),
                last_modified,
            },
        );
    }

    fn require_bucket(&self) -> StorageResult<()> {
        if self.bucket_exists.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::BucketMissing(BUCKET.to_string()))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| ObjectMeta {
                size: o.data.len() as u64,
                last_modified: Some(o.last_modified),
                content_type: Some(o.content_type.clone()),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.require_bucket()?;
        let should_fail = self
            .fail_puts_containing
            .lock()
            .unwrap()
            .iter()
            .any(|f| key.contains(f.as_str()));
        if should_fail {
            return Err(StorageError::Io(std::io::Error::other("injected put failure")));
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.require_bucket()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://files.test/{BUCKET}/{key}")
    }

    fn bucket(&self) -> &str {
        BUCKET
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl BucketAdmin for MemoryStore {
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        if self.bucket_exists.load(Ordering::SeqCst) {
            Ok(vec![BUCKET.to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn create_bucket(&self, _name: &str) -> StorageResult<BucketCreation> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.create_is_noop.load(Ordering::SeqCst) {
            self.bucket_exists.store(true, Ordering::SeqCst);
        }
        Ok(BucketCreation::Created)
    }
}

/// File record repository over a vector.
#[derive(Default)]
pub struct MemoryRecords {
    rows: Mutex<Vec<FileRecordRow>>,
    fail_names_containing: Mutex<Vec<String>>,
}

impl MemoryRecords {
    /// Fail inserts for records whose display name contains `fragment`.
    pub fn fail_inserts_containing(&self, fragment: &str) {
        self.fail_names_containing
            .lock()
            .unwrap()
            .push(fragment.to_string());
    }

    pub fn rows(&self) -> Vec<FileRecordRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileRecordRepo for MemoryRecords {
    async fn insert_file_record(&self, record: &FileRecordRow) -> MetadataResult<()> {
        let should_fail = self
            .fail_names_containing
            .lock()
            .unwrap()
            .iter()
            .any(|f| record.display_name.contains(f.as_str()));
        if should_fail {
            return Err(MetadataError::Config("injected insert failure".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.storage_key == record.storage_key) {
            return Err(MetadataError::AlreadyExists(record.storage_key.clone()));
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecordRow>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn list_file_records(
        &self,
        parent_reference: &str,
    ) -> MetadataResult<Vec<FileRecordRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.parent_reference == parent_reference)
            .cloned()
            .collect())
    }

    async fn file_record_exists_for_key(&self, storage_key: &str) -> MetadataResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.storage_key == storage_key))
    }

    async fn count_file_records(&self) -> MetadataResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

/// Converter that fails or panics for chosen file names.
#[derive(Default)]
pub struct FakeConverter {
    pub fail_names: Vec<String>,
    pub panic_names: Vec<String>,
    pub calls: AtomicUsize,
    pub mime_types: Mutex<Vec<String>>,
}

impl FakeConverter {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn panicking(names: &[&str]) -> Self {
        Self {
            panic_names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert_to_pdf(
        &self,
        file_name: &str,
        mime_type: &str,
        _data: Bytes,
    ) -> IngestResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        if self.panic_names.iter().any(|n| n == file_name) {
            panic!("converter exploded on {file_name}");
        }
        if self.fail_names.iter().any(|n| n == file_name) {
            return Err(IngestError::Conversion(format!(
                "/convert-word-to-pdf returned 500: cannot convert {file_name}"
            )));
        }
        Ok(Bytes::from(format!("%PDF-1.7 converted from {file_name}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OptimizerBehavior {
    Shrink,
    Identity,
    Fail,
}

pub struct FakeOptimizer {
    pub behavior: OptimizerBehavior,
    pub calls: AtomicUsize,
}

impl FakeOptimizer {
    pub fn new(behavior: OptimizerBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PdfOptimizer for FakeOptimizer {
    async fn optimize(&self, _file_name: &str, data: Bytes) -> IngestResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            OptimizerBehavior::Shrink => Ok(Bytes::from_static(b"%PDF-opt")),
            OptimizerBehavior::Identity => Ok(data),
            OptimizerBehavior::Fail => Err(IngestError::Conversion("gs crashed".to_string())),
        }
    }
}

/// A store, a record repo and an orchestrator wired together.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub records: Arc<MemoryRecords>,
    pub config: IngestConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_bucket(true)
    }

    pub fn with_bucket(bucket_exists: bool) -> Self {
        let config = IngestConfig {
            provision_timeout_secs: 1,
            provision_poll_ms: 10,
            ..IngestConfig::default()
        };
        Self {
            store: Arc::new(MemoryStore::new(bucket_exists)),
            records: Arc::new(MemoryRecords::default()),
            config,
        }
    }

    pub fn storage(&self) -> Storage {
        Storage {
            objects: self.store.clone(),
            buckets: self.store.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.config.clone(), &self.storage(), self.records.clone())
    }
}

pub fn pdf(name: &str) -> SourceFile {
    SourceFile::new(
        name,
        Some(docket_core::PDF_MIME.to_string()),
        Bytes::from(format!("%PDF-1.4 {name}")),
    )
}

pub fn docx(name: &str) -> SourceFile {
    SourceFile::new(name, None, Bytes::from(format!("PK\x03\x04 {name}")))
}
