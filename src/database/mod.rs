// Database module
// Record models, the vector store contract and its LanceDB and in-memory implementations

pub mod consistency;
pub mod lancedb;
pub mod memory;
pub mod models;

use async_trait::async_trait;

use crate::Result;

pub use consistency::{ConsistencyReport, validate_consistency};
pub use lancedb::LanceVectorStore;
pub use memory::InMemoryVectorStore;
pub use models::{InsertOutcome, QueryResult, Record, RecordId, RecordKey};

/// Storage and similarity search for question and answer records.
///
/// Implementations must keep read-after-write consistency for `exists` and
/// `has_children` within one process, and must never overwrite or merge on
/// `insert`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Best match first, at most `top_k` hits, empty for an empty store
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>>;

    async fn exists(&self, source_id: i64, is_question: bool) -> Result<bool>;

    /// True iff at least one stored record has this `parent_id`
    async fn has_children(&self, parent_id: i64) -> Result<bool>;

    /// Append one record
    async fn insert(&self, record: Record) -> Result<RecordId>;

    /// Whether `insert_if_absent` is atomic against concurrent writers
    fn supports_conditional_insert(&self) -> bool {
        false
    }

    /// Insert unless a record with the same `(source_id, is_question)` is stored.
    ///
    /// The default is a plain check followed by an insert, so two writers can
    /// both observe "absent". Stores that can do better override this and
    /// report `supports_conditional_insert`.
    async fn insert_if_absent(&self, record: Record) -> Result<InsertOutcome> {
        if self.exists(record.source_id, record.is_question).await? {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.insert(record).await.map(InsertOutcome::Inserted)
    }

    async fn count(&self) -> Result<u64>;

    /// Every stored record identity, in no particular order
    async fn list_keys(&self) -> Result<Vec<RecordKey>>;
}
