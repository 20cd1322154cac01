//! Local filesystem storage backend.
//!
//! Buckets are directories directly below the root. Objects are files below
//! their bucket directory, with `/` in keys mapped to subdirectories.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BucketAdmin, BucketCreation, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
    bucket: String,
    public_base_url: Option<String>,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    ///
    /// The bucket directory is not created here; that is the provisioner's job.
    pub async fn new(
        root: impl AsRef<Path>,
        bucket: impl Into<String>,
        public_base_url: Option<String>,
    ) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let bucket = bucket.into();
        validate_bucket_name(&bucket)?;
        Ok(Self {
            root,
            bucket,
            public_base_url: public_base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    /// Get the full path for a key, rejecting anything that could leave the bucket.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains("..") {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        Ok(self.bucket_dir().join(key))
    }

    async fn require_bucket(&self) -> StorageResult<()> {
        match fs::metadata(self.bucket_dir()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Config(format!(
                "bucket path is not a directory: {}",
                self.bucket_dir().display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::BucketMissing(self.bucket.clone()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }
}

fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::Config(format!("invalid bucket name: {name:?}")))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(Self::not_found(key))?;

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: None,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(Self::not_found(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.require_bucket().await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write, fsync, then rename so readers never observe a partial object.
        let temp_name = format!("{TEMP_MARKER}{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            // Listings hide temp files; drop it on every failure.
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).await.map_err(Self::not_found(key))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.require_bucket().await?;
        let bucket_dir = self.bucket_dir();
        let mut results = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.contains(TEMP_MARKER) {
                    continue;
                }
                if key.starts_with(prefix) {
                    results.push(key);
                }
            }
        }

        results.sort();
        Ok(results)
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{}/{key}", self.bucket),
            None => format!("file://{}", self.bucket_dir().join(key).display()),
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        fs::metadata(&self.root).await?;
        Ok(())
    }
}

#[async_trait]
impl BucketAdmin for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create_bucket(&self, name: &str) -> StorageResult<BucketCreation> {
        validate_bucket_name(name)?;
        match fs::create_dir(self.root.join(name)).await {
            Ok(()) => Ok(BucketCreation::Created),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(BucketCreation::AlreadyExists)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
