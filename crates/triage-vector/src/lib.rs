//! Embedding storage and similarity math for backlog triage.
//!
//! `VectorStore` has two backends: a process-local map without neighbor
//! search and a SQLite store that persists vectors across runs and ranks
//! neighbors by cosine similarity.

pub mod item;
pub mod similarity;
pub mod sqlite;
pub mod store;
pub mod volatile;

pub use item::{ContentIdentity, ItemMetadata, ItemType, SimilarItem, StoredVector};
pub use similarity::{cosine_similarity, validate_embedding};
pub use sqlite::SqliteVectorStore;
pub use store::{VectorError, VectorStore};
pub use volatile::VolatileVectorStore;
