
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::VectorStore;
use super::models::{InsertOutcome, QueryResult, Record, RecordId, RecordKey, cosine_similarity};
use crate::{Result, StackRagError};

/// Process-local vector store with brute-force cosine search
pub struct InMemoryVectorStore {
    records: Mutex<Vec<Record>>,
    vector_dimension: usize,
    conditional_insert: bool,
}

impl InMemoryVectorStore {
    #[inline]
    pub fn new(vector_dimension: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            vector_dimension,
            conditional_insert: true,
        }
    }

    /// A store that only offers the check-then-insert fallback
    #[inline]
    pub fn best_effort(vector_dimension: usize) -> Self {
        Self {
            conditional_insert: false,
            ..Self::new(vector_dimension)
        }
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Copy of every stored record in insertion order
    #[inline]
    pub fn snapshot(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Record>>> {
        self.records
            .lock()
            .map_err(|_| StackRagError::Store("In-memory store lock poisoned".to_string()))
    }

    fn check_dimension(&self, record: &Record) -> Result<()> {
        if record.embedding.len() != self.vector_dimension {
            return Err(StackRagError::Store(format!(
                "Embedding for {} has {} dimensions, store expects {}",
                record.key(),
                record.embedding.len(),
                self.vector_dimension
            )));
        }
        Ok(())
    }
}

fn contains(records: &[Record], source_id: i64, is_question: bool) -> bool {
    records
        .iter()
        .any(|r| r.source_id == source_id && r.is_question == is_question)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        let records = self.lock()?;
        let mut results: Vec<QueryResult> = records
            .iter()
            .map(|record| QueryResult {
                score: cosine_similarity(vector, &record.embedding),
                record: record.clone(),
            })
            .collect();
        drop(records);

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        debug!("In-memory search returned {} results", results.len());
        Ok(results)
    }

    async fn exists(&self, source_id: i64, is_question: bool) -> Result<bool> {
        Ok(contains(&self.lock()?, source_id, is_question))
    }

    async fn has_children(&self, parent_id: i64) -> Result<bool> {
        Ok(self
            .lock()?
            .iter()
            .any(|r| !r.is_question && r.parent_id == parent_id))
    }

    async fn insert(&self, record: Record) -> Result<RecordId> {
        self.check_dimension(&record)?;
        let id = record.key().record_id();
        self.lock()?.push(record);
        Ok(id)
    }

    fn supports_conditional_insert(&self) -> bool {
        self.conditional_insert
    }

    async fn insert_if_absent(&self, record: Record) -> Result<InsertOutcome> {
        if !self.conditional_insert {
            if self.exists(record.source_id, record.is_question).await? {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            return self.insert(record).await.map(InsertOutcome::Inserted);
        }

        self.check_dimension(&record)?;
        let mut records = self.lock()?;
        if contains(&records, record.source_id, record.is_question) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        let id = record.key().record_id();
        records.push(record);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.lock()?.len() as u64)
    }

    async fn list_keys(&self) -> Result<Vec<RecordKey>> {
        Ok(self.lock()?.iter().map(Record::key).collect())
    }
}
