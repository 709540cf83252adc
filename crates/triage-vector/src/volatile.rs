use std::collections::HashMap;
use std::sync::Mutex;

use crate::item::{ItemMetadata, SimilarItem, StoredVector};
use crate::store::{VectorError, VectorStore};

#[derive(Debug, Default)]
/// Process-local vector cache.
///
/// Keeps nothing across runs and does not answer neighbor queries:
/// `find_similar` always returns an empty list, so callers need their own
/// linear-scan fallback.
pub struct VolatileVectorStore {
    entries: Mutex<HashMap<String, StoredVector>>,
}

impl VolatileVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorStore for VolatileVectorStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn initialize(&self) -> Result<(), VectorError> {
        Ok(())
    }

    fn store_embedding(
        &self,
        key: &str,
        vector: &[f32],
        item: &ItemMetadata,
    ) -> Result<(), VectorError> {
        let mut entries = self.entries.lock().map_err(|_| VectorError::LockPoisoned)?;
        entries.insert(
            key.to_string(),
            StoredVector {
                key: key.to_string(),
                vector: vector.to_vec(),
                item: item.clone(),
            },
        );
        Ok(())
    }

    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>, VectorError> {
        let entries = self.entries.lock().map_err(|_| VectorError::LockPoisoned)?;
        Ok(entries.get(key).map(|stored| stored.vector.clone()))
    }

    fn find_similar(
        &self,
        _query: &[f32],
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<SimilarItem>, VectorError> {
        Ok(Vec::new())
    }

    fn close(&self) -> Result<(), VectorError> {
        Ok(())
    }
}
