//! SQLite vector store backend.
//!
//! Provides [`SqliteVectorStore`] which implements [`VectorStore`] on top of a
//! single SQLite file using [sqlx](https://docs.rs/sqlx). The file is the whole
//! persisted state: a fresh process opening the same path sees every record
//! written by earlier runs and returns identical search results.
//!
//! # Layout
//!
//! - `segments(seq, id, text, source, locator_kind, locator_value,
//!   start_offset, end_offset, vector)` where `seq` is the insertion order and
//!   `vector` holds little-endian `f32`s.
//! - `index_meta(key, value)` holding the index `dimensions`.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::sqlite::SqliteVectorStore;
//!
//! let store = SqliteVectorStore::open("docrag.db").await?;
//! store.upsert_if_absent(&segment).await?;
//! let results = store.search(&query_embedding, 3).await?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::{Locator, SearchResult, Segment, SourceMetadata};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, check_dimensions, rank};

const BACKEND: &str = "sqlite";

const CREATE_SEGMENTS: &str = "CREATE TABLE IF NOT EXISTS segments (\
        seq INTEGER PRIMARY KEY AUTOINCREMENT, \
        id TEXT NOT NULL UNIQUE, \
        text TEXT NOT NULL, \
        source TEXT NOT NULL, \
        locator_kind TEXT NOT NULL, \
        locator_value INTEGER NOT NULL, \
        start_offset INTEGER NOT NULL, \
        end_offset INTEGER NOT NULL, \
        vector BLOB NOT NULL\
    )";

const CREATE_META: &str =
    "CREATE TABLE IF NOT EXISTS index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

const INSERT_COLUMNS: &str = "INSERT INTO segments \
        (id, text, source, locator_kind, locator_value, start_offset, end_offset, vector) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// A [`VectorStore`] persisted in a SQLite database file.
///
/// Writes go through a store-level mutex and SQLite's own writer lock, so
/// concurrent writers (including other processes) never interleave partial
/// records. Searches read through the pool concurrently with writes.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SqliteVectorStore {
    /// Open (creating if missing) the index stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the file cannot be opened or is
    /// not a usable database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| RagError::IndexUnavailable {
                backend: BACKEND.to_string(),
                message: format!("cannot create '{}': {e}", parent.display()),
                retryable: false,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(Self::map_err)?;

        sqlx::query(CREATE_SEGMENTS).execute(&pool).await.map_err(Self::map_err)?;
        sqlx::query(CREATE_META).execute(&pool).await.map_err(Self::map_err)?;

        debug!(path = %path.display(), "opened sqlite vector store");
        Ok(Self { pool, path, write_lock: Mutex::new(()) })
    }

    /// The database file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the underlying connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn map_err(e: sqlx::Error) -> RagError {
        // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
        let retryable = match &e {
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            sqlx::Error::PoolTimedOut => true,
            _ => false,
        };
        RagError::IndexUnavailable { backend: BACKEND.to_string(), message: e.to_string(), retryable }
    }

    fn corrupt(message: impl Into<String>) -> RagError {
        RagError::IndexUnavailable {
            backend: BACKEND.to_string(),
            message: message.into(),
            retryable: false,
        }
    }

    fn encode_vector(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(Self::corrupt(format!("vector blob of {} bytes is not f32-aligned", bytes.len())));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn decode_row(row: &SqliteRow) -> Result<Segment> {
        let get_i64 = |column: &str| row.try_get::<i64, _>(column).map_err(Self::map_err);

        let kind: String = row.try_get("locator_kind").map_err(Self::map_err)?;
        let value = get_i64("locator_value")?;
        let locator = Locator::from_parts(&kind, value as u64)
            .ok_or_else(|| Self::corrupt(format!("unknown locator '{kind}'")))?;
        let vector: Vec<u8> = row.try_get("vector").map_err(Self::map_err)?;

        Ok(Segment {
            id: row.try_get("id").map_err(Self::map_err)?,
            text: row.try_get("text").map_err(Self::map_err)?,
            metadata: SourceMetadata {
                source: row.try_get("source").map_err(Self::map_err)?,
                locator,
                start: get_i64("start_offset")? as usize,
                end: get_i64("end_offset")? as usize,
            },
            vector: Self::decode_vector(&vector)?,
        })
    }

    async fn stored_dimensions(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimensions'")
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::map_err)?;

        value
            .map(|v| v.parse::<usize>().map_err(|_| Self::corrupt(format!("bad dimensions '{v}'"))))
            .transpose()
    }

    /// Insert `segment`, resolving id conflicts with `on_conflict`. Returns
    /// whether a row was written.
    async fn write(&self, segment: &Segment, on_conflict: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        check_dimensions(self.stored_dimensions().await?, &segment.vector)?;

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        let sql = format!("{INSERT_COLUMNS} {on_conflict}");
        let result = sqlx::query(&sql)
            .bind(&segment.id)
            .bind(&segment.text)
            .bind(&segment.metadata.source)
            .bind(segment.metadata.locator.kind())
            .bind(segment.metadata.locator.value() as i64)
            .bind(segment.metadata.start as i64)
            .bind(segment.metadata.end as i64)
            .bind(Self::encode_vector(&segment.vector))
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;

        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES ('dimensions', ?) \
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(segment.vector.len().to_string())
        .execute(&mut *tx)
        .await
        .map_err(Self::map_err)?;

        tx.commit().await.map_err(Self::map_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, segment: &Segment) -> Result<()> {
        self.write(
            segment,
            "ON CONFLICT(id) DO UPDATE SET \
                text = excluded.text, \
                source = excluded.source, \
                locator_kind = excluded.locator_kind, \
                locator_value = excluded.locator_value, \
                start_offset = excluded.start_offset, \
                end_offset = excluded.end_offset, \
                vector = excluded.vector",
        )
        .await?;
        debug!(id = %segment.id, "upserted segment");
        Ok(())
    }

    async fn upsert_if_absent(&self, segment: &Segment) -> Result<bool> {
        let inserted = self.write(segment, "ON CONFLICT(id) DO NOTHING").await?;
        debug!(id = %segment.id, inserted, "upsert_if_absent");
        Ok(inserted)
    }

    async fn has(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM segments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(found.is_some())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let Some(dimensions) = self.stored_dimensions().await? else {
            return Ok(Vec::new());
        };
        check_dimensions(Some(dimensions), embedding)?;

        let rows = sqlx::query(
            "SELECT id, text, source, locator_kind, locator_value, start_offset, end_offset, vector \
             FROM segments ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;

        let segments = rows.iter().map(Self::decode_row).collect::<Result<Vec<_>>>()?;
        Ok(rank(segments, embedding, top_k))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments")
            .fetch_one(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(count as usize)
    }

    async fn dimensions(&self) -> Result<Option<usize>> {
        self.stored_dimensions().await
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query("DELETE FROM segments").execute(&mut *tx).await.map_err(Self::map_err)?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await.map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;

        debug!(path = %self.path.display(), "cleared sqlite vector store");
        Ok(())
    }
}
