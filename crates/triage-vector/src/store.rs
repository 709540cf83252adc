use thiserror::Error;

use crate::item::{ItemMetadata, SimilarItem};

#[derive(Debug, Error)]
/// Errors raised by similarity math and vector stores.
pub enum VectorError {
    #[error("vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("vector component {index} is not finite")]
    NonFinite { index: usize },
    #[error("vector is empty")]
    Empty,
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid similarity threshold {0}")]
    InvalidThreshold(f64),
    #[error("vector store is not initialized; call initialize() first")]
    NotInitialized,
    #[error("vector store is closed")]
    Closed,
    #[error("vector store belongs to repository '{bound}', not '{requested}'; use a separate store path per repository")]
    RepositoryMismatch { bound: String, requested: String },
    #[error("vector store lock poisoned")]
    LockPoisoned,
    #[error("vector store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupted vector row '{key}': {reason}")]
    CorruptedRow { key: String, reason: String },
}

/// Storage for item embeddings keyed by content identity.
///
/// `store_embedding` is an upsert: a repeated key replaces the previous row.
/// `find_similar` returns hits ordered by descending similarity, all at or
/// above `threshold`, at most `limit` long.
pub trait VectorStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Idempotent setup of the backing resource.
    fn initialize(&self) -> Result<(), VectorError>;

    /// Fails when the store cannot serve reads or writes yet.
    fn ensure_ready(&self) -> Result<(), VectorError> {
        Ok(())
    }

    fn store_embedding(
        &self,
        key: &str,
        vector: &[f32],
        item: &ItemMetadata,
    ) -> Result<(), VectorError>;

    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>, VectorError>;

    fn find_similar(
        &self,
        query: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarItem>, VectorError>;

    /// Releases held resources. Later calls fail with `VectorError::Closed`.
    fn close(&self) -> Result<(), VectorError>;
}
