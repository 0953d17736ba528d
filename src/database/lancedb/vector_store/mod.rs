#[cfg(test)]
mod tests;

use super::{EMBEDDING_COLUMN, TABLE_NAME, embedding_dimension, record_schema};
use crate::config::Config;
use crate::database::VectorStore;
use crate::database::models::{InsertOutcome, QueryResult, Record, RecordId, RecordKey};
use crate::{Result, StackRagError};
use arrow::array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator,
    StringArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Vector store backed by a local LanceDB table
pub struct LanceVectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
    /// Serializes writes so check-then-insert is atomic within this process
    write_gate: Mutex<()>,
}

impl LanceVectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Open or create the records table at `db_path`.
    ///
    /// An existing table must have been created with the same embedding
    /// dimension; stored records are never dropped to accommodate a new one.
    #[inline]
    pub async fn open(db_path: &Path, vector_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            StackRagError::Store(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension,
            write_gate: Mutex::new(()),
        };
        store.initialize_table().await?;

        info!(
            "Vector store initialized with {} dimensions",
            store.vector_dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let table = self.open_table().await?;
            let schema = table
                .schema()
                .await
                .map_err(|e| StackRagError::Store(format!("Failed to get table schema: {}", e)))?;

            let existing = embedding_dimension(&schema).ok_or_else(|| {
                StackRagError::Store("Could not determine stored embedding dimension".to_string())
            })?;
            if existing != self.vector_dimension {
                return Err(StackRagError::Config(format!(
                    "Vector store was created with {} dimensions but the configured embedding dimension is {}",
                    existing, self.vector_dimension
                )));
            }

            debug!("Records table already exists with {} dimensions", existing);
            return Ok(());
        }

        info!(
            "Creating records table with {} dimensions",
            self.vector_dimension
        );
        self.connection
            .create_empty_table(&self.table_name, record_schema(self.vector_dimension))
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to open table: {}", e)))
    }

    async fn count_matching(&self, predicate: String) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(Some(predicate))
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to count rows: {}", e)))
    }

    /// Append one record. Callers must hold the write gate.
    async fn append(&self, record: &Record) -> Result<RecordId> {
        let record_batch = self.create_record_batch(record)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to insert record: {}", e)))?;

        debug!("Stored {}", record.key());
        Ok(record.key().record_id())
    }

    /// Create a single-row RecordBatch from a record
    fn create_record_batch(&self, record: &Record) -> Result<RecordBatch> {
        if record.embedding.len() != self.vector_dimension {
            return Err(StackRagError::Store(format!(
                "Embedding for {} has {} dimensions, store expects {}",
                record.key(),
                record.embedding.len(),
                self.vector_dimension
            )));
        }

        let values_array = Float32Array::from(record.embedding.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| StackRagError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(Int64Array::from(vec![record.source_id])),
            Arc::new(Int64Array::from(vec![record.parent_id])),
            Arc::new(BooleanArray::from(vec![record.is_question])),
            Arc::new(StringArray::from(vec![record.title.as_str()])),
            Arc::new(StringArray::from(vec![record.body.as_str()])),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(record_schema(self.vector_dimension), arrays)
            .map_err(|e| StackRagError::Store(format!("Failed to create record batch: {}", e)))
    }

    /// Parse a record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<QueryResult>> {
        let keys = Self::parse_key_columns(batch)?;

        let titles = string_column(batch, "title")?;
        let bodies = string_column(batch, "body")?;
        let embeddings = batch
            .column_by_name(EMBEDDING_COLUMN)
            .ok_or_else(|| StackRagError::Store("Missing embedding column".to_string()))?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| StackRagError::Store("Invalid embedding column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(keys.len());
        for (row, key) in keys.into_iter().enumerate() {
            let embedding = embeddings
                .value(row)
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|values| values.values().to_vec())
                .unwrap_or_default();

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            results.push(QueryResult {
                record: Record {
                    source_id: key.source_id,
                    parent_id: key.parent_id,
                    is_question: key.is_question,
                    title: titles.value(row).to_string(),
                    body: bodies.value(row).to_string(),
                    embedding,
                },
                // Cosine distance to similarity, higher is better
                score: 1.0 - distance,
            });
        }

        Ok(results)
    }

    fn parse_key_columns(batch: &RecordBatch) -> Result<Vec<RecordKey>> {
        let source_ids = int64_column(batch, "source_id")?;
        let parent_ids = int64_column(batch, "parent_id")?;
        let is_questions = batch
            .column_by_name("is_question")
            .ok_or_else(|| StackRagError::Store("Missing is_question column".to_string()))?
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| StackRagError::Store("Invalid is_question column type".to_string()))?;

        Ok((0..batch.num_rows())
            .map(|row| RecordKey {
                source_id: source_ids.value(row),
                parent_id: parent_ids.value(row),
                is_question: is_questions.value(row),
            })
            .collect())
    }
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StackRagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| StackRagError::Store(format!("Invalid {} column type", name)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StackRagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StackRagError::Store(format!("Invalid {} column type", name)))
}

fn key_predicate(source_id: i64, is_question: bool) -> String {
    format!("source_id = {} AND is_question = {}", source_id, is_question)
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        debug!("Searching for similar vectors with limit: {}", top_k);

        if top_k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut results = table
            .vector_search(vector)
            .map_err(|e| StackRagError::Store(format!("Failed to create vector search: {}", e)))?
            .column(EMBEDDING_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!("Parsed {} search results", hits.len());
        Ok(hits)
    }

    async fn exists(&self, source_id: i64, is_question: bool) -> Result<bool> {
        Ok(self
            .count_matching(key_predicate(source_id, is_question))
            .await?
            > 0)
    }

    async fn has_children(&self, parent_id: i64) -> Result<bool> {
        Ok(self
            .count_matching(format!(
                "parent_id = {} AND is_question = false",
                parent_id
            ))
            .await?
            > 0)
    }

    async fn insert(&self, record: Record) -> Result<RecordId> {
        let _gate = self.write_gate.lock().await;
        self.append(&record).await
    }

    fn supports_conditional_insert(&self) -> bool {
        true
    }

    async fn insert_if_absent(&self, record: Record) -> Result<InsertOutcome> {
        let _gate = self.write_gate.lock().await;
        if self
            .count_matching(key_predicate(record.source_id, record.is_question))
            .await?
            > 0
        {
            debug!("{} already stored", record.key());
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.append(&record).await.map(InsertOutcome::Inserted)
    }

    async fn count(&self) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    async fn list_keys(&self) -> Result<Vec<RecordKey>> {
        let table = self.open_table().await?;
        let mut stream = table
            .query()
            .select(Select::columns(&["source_id", "parent_id", "is_question"]))
            .execute()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to scan records: {}", e)))?;

        let mut keys = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| StackRagError::Store(format!("Failed to read scan stream: {}", e)))?
        {
            keys.extend(Self::parse_key_columns(&batch)?);
        }
        Ok(keys)
    }
}
