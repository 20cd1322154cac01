//! Metadata store implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::models::FileRecordRow;
use crate::repos::FileRecordRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRecordRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store. `":memory:"` opens a private in-memory database.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        let opts = if path == Path::new(":memory:") {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };
        // Prevent transient "database is locked" errors under concurrent access.
        let opts = opts.busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection keeps writers serialized and the in-memory database shared.
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// SQLite cannot cancel statements, so the timeout only produces a warning.
    fn note_duration(&self, operation: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "Metadata query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one != 1 {
            return Err(MetadataError::Config(
                "unexpected health check result".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FileRecordRepo for SqliteStore {
    async fn insert_file_record(&self, record: &FileRecordRow) -> MetadataResult<()> {
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO file_records (id, parent_reference, display_name, url, storage_key, size, mime_type, creator_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.parent_reference)
        .bind(&record.display_name)
        .bind(&record.url)
        .bind(&record.storage_key)
        .bind(record.size)
        .bind(&record.mime_type)
        .bind(&record.creator_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        self.note_duration("insert_file_record", started);
        Ok(())
    }

    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecordRow>> {
        let row = sqlx::query_as::<_, FileRecordRow>("SELECT * FROM file_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_file_records(
        &self,
        parent_reference: &str,
    ) -> MetadataResult<Vec<FileRecordRow>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, FileRecordRow>(
            "SELECT * FROM file_records WHERE parent_reference = ? ORDER BY created_at, storage_key",
        )
        .bind(parent_reference)
        .fetch_all(&self.pool)
        .await?;
        self.note_duration("list_file_records", started);
        Ok(rows)
    }

    async fn file_record_exists_for_key(&self, storage_key: &str) -> MetadataResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM file_records WHERE storage_key = ?)",
        )
        .bind(storage_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_file_records(&self) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS file_records (
    id BLOB PRIMARY KEY NOT NULL,
    parent_reference TEXT NOT NULL,
    display_name TEXT NOT NULL,
    url TEXT NOT NULL,
    storage_key TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL CHECK (size >= 0),
    mime_type TEXT NOT NULL,
    creator_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_file_records_parent
    ON file_records (parent_reference, created_at);
"#;
