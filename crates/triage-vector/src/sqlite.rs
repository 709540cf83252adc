use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::item::{ItemMetadata, ItemType, SimilarItem};
use crate::similarity::{cosine_similarity, validate_embedding};
use crate::store::{VectorError, VectorStore};

/// Persistent vector store backed by a SQLite file.
///
/// Vectors are stored as little-endian `f32` blobs, so reads round-trip
/// bit-for-bit. Neighbor queries scan the rows sharing the query's
/// dimensionality (indexed) and rank them by cosine similarity.
pub struct SqliteVectorStore {
    path: Option<PathBuf>,
    connection: Mutex<Option<Connection>>,
    initialized: AtomicBool,
}

impl SqliteVectorStore {
    /// Opens (or creates) the store file. Call `initialize` before use.
    pub fn open(path: &Path) -> Result<Self, VectorError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(Self::from_connection(Some(path.to_path_buf()), connection))
    }

    pub fn open_in_memory() -> Result<Self, VectorError> {
        Ok(Self::from_connection(None, Connection::open_in_memory()?))
    }

    fn from_connection(path: Option<PathBuf>, connection: Connection) -> Self {
        Self {
            path,
            connection: Mutex::new(Some(connection)),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, VectorError> {
        self.connection.lock().map_err(|_| VectorError::LockPoisoned)
    }

    /// Runs `operation` against an open, initialized connection.
    fn with_ready_connection<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, VectorError>,
    ) -> Result<T, VectorError> {
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(VectorError::Closed)?;
        if !self.initialized.load(Ordering::Acquire) {
            return Err(VectorError::NotInitialized);
        }
        operation(connection)
    }
}

impl VectorStore for SqliteVectorStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn initialize(&self) -> Result<(), VectorError> {
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(VectorError::Closed)?;
        initialize_vector_schema(connection)?;
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(path = ?self.path, "vector store schema ready");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), VectorError> {
        self.with_ready_connection(|_| Ok(()))
    }

    #[tracing::instrument(level = "debug", skip(self, vector, item), fields(dimensions = vector.len()))]
    fn store_embedding(
        &self,
        key: &str,
        vector: &[f32],
        item: &ItemMetadata,
    ) -> Result<(), VectorError> {
        validate_embedding(vector, None)?;
        self.with_ready_connection(|connection| {
            connection.execute(
                r#"
                INSERT INTO triage_vectors (
                    cache_key,
                    item_number,
                    item_type,
                    title,
                    url,
                    created_at,
                    dimensions,
                    embedding,
                    updated_unix_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(cache_key)
                DO UPDATE SET
                    item_number = excluded.item_number,
                    item_type = excluded.item_type,
                    title = excluded.title,
                    url = excluded.url,
                    created_at = excluded.created_at,
                    dimensions = excluded.dimensions,
                    embedding = excluded.embedding,
                    updated_unix_ms = excluded.updated_unix_ms
                "#,
                params![
                    key,
                    item.number as i64,
                    item.item_type.as_str(),
                    item.title,
                    item.url,
                    item.created_at.to_rfc3339(),
                    vector.len() as i64,
                    encode_vector(vector),
                    current_unix_timestamp_ms() as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>, VectorError> {
        self.with_ready_connection(|connection| {
            let blob = connection
                .query_row(
                    "SELECT embedding FROM triage_vectors WHERE cache_key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            blob.map(|bytes| decode_vector(key, &bytes)).transpose()
        })
    }

    #[tracing::instrument(level = "debug", skip(self, query), fields(dimensions = query.len()))]
    fn find_similar(
        &self,
        query: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarItem>, VectorError> {
        if !threshold.is_finite() {
            return Err(VectorError::InvalidThreshold(threshold));
        }
        validate_embedding(query, None)?;
        self.with_ready_connection(|connection| {
            if limit == 0 {
                return Ok(Vec::new());
            }
            let mut statement = connection.prepare(
                r#"
                SELECT cache_key, item_number, item_type, title, url, embedding
                FROM triage_vectors
                WHERE dimensions = ?1
                "#,
            )?;
            let mut rows = statement.query(params![query.len() as i64])?;
            let mut hits = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let embedding = decode_vector(&key, &row.get::<_, Vec<u8>>(5)?)?;
                let similarity = cosine_similarity(query, &embedding)?;
                if similarity < threshold {
                    continue;
                }
                let raw_type: String = row.get(2)?;
                let item_type = raw_type
                    .parse::<ItemType>()
                    .map_err(|reason| VectorError::CorruptedRow {
                        key: key.clone(),
                        reason,
                    })?;
                hits.push((
                    key,
                    SimilarItem {
                        number: row.get::<_, i64>(1)? as u64,
                        title: row.get(3)?,
                        url: row.get(4)?,
                        similarity,
                        item_type,
                    },
                ));
            }

            hits.sort_by(|left, right| {
                right
                    .1
                    .similarity
                    .total_cmp(&left.1.similarity)
                    .then_with(|| left.0.cmp(&right.0))
            });
            hits.truncate(limit);
            tracing::debug!(returned = hits.len(), threshold, "vector neighbor query");
            Ok(hits.into_iter().map(|(_, item)| item).collect())
        })
    }

    fn close(&self) -> Result<(), VectorError> {
        let mut guard = self.lock()?;
        if let Some(connection) = guard.take() {
            connection.close().map_err(|(_, error)| VectorError::Sqlite(error))?;
        }
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

impl SqliteVectorStore {
    /// Binds the store file to one repository.
    ///
    /// Cache keys are only unique within a repository (`issue-<n>`), so the
    /// first call records `repository` and later calls with another slug fail
    /// with `RepositoryMismatch`. Slugs compare case-insensitively.
    pub fn bind_repository(&self, repository: &str) -> Result<(), VectorError> {
        let requested = repository.trim().to_ascii_lowercase();
        self.with_ready_connection(|connection| {
            connection.execute(
                r#"
                INSERT INTO triage_store_meta (meta_key, meta_value)
                VALUES ('repository', ?1)
                ON CONFLICT(meta_key) DO NOTHING
                "#,
                params![requested],
            )?;
            let bound: String = connection.query_row(
                "SELECT meta_value FROM triage_store_meta WHERE meta_key = 'repository'",
                [],
                |row| row.get(0),
            )?;
            if bound != requested {
                return Err(VectorError::RepositoryMismatch { bound, requested });
            }
            Ok(())
        })
    }

    /// Reads back full metadata for a key, mainly for diagnostics.
    pub fn get_metadata(&self, key: &str) -> Result<Option<ItemMetadata>, VectorError> {
        self.with_ready_connection(|connection| {
            let row = connection
                .query_row(
                    r#"
                    SELECT item_number, item_type, title, url, created_at
                    FROM triage_vectors
                    WHERE cache_key = ?1
                    "#,
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;
            let Some((number, raw_type, title, url, created_at)) = row else {
                return Ok(None);
            };
            let corrupted = |reason: String| VectorError::CorruptedRow {
                key: key.to_string(),
                reason,
            };
            Ok(Some(ItemMetadata {
                number: number as u64,
                item_type: raw_type.parse::<ItemType>().map_err(corrupted)?,
                title,
                url,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|error| corrupted(error.to_string()))?
                    .with_timezone(&Utc),
            }))
        })
    }
}

/// Ensure vector schema and indexes exist before reads/writes.
fn initialize_vector_schema(connection: &Connection) -> Result<(), VectorError> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS triage_vectors (
            cache_key TEXT PRIMARY KEY,
            item_number INTEGER NOT NULL,
            item_type TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            updated_unix_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_triage_vectors_dimensions
            ON triage_vectors(dimensions);
        CREATE INDEX IF NOT EXISTS idx_triage_vectors_item
            ON triage_vectors(item_type, item_number);
        CREATE TABLE IF NOT EXISTS triage_store_meta (
            meta_key TEXT PRIMARY KEY,
            meta_value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector
        .iter()
        .flat_map(|component| component.to_le_bytes())
        .collect()
}

fn decode_vector(key: &str, bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorError::CorruptedRow {
            key: key.to_string(),
            reason: format!("embedding blob length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
