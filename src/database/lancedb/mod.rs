// LanceDB vector database module
// Persists question and answer records with their embeddings


pub mod vector_store;

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub use vector_store::LanceVectorStore;

pub const TABLE_NAME: &str = "stackoverflow_qa";
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Arrow schema of the records table. This layout is persisted and must stay stable.
#[inline]
pub fn record_schema(vector_dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("source_id", DataType::Int64, false),
        Field::new("parent_id", DataType::Int64, false),
        Field::new("is_question", DataType::Boolean, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("body", DataType::Utf8, false),
        Field::new(
            EMBEDDING_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dimension as i32,
            ),
            false,
        ),
    ]))
}

/// Read the embedding dimension back out of a stored schema
#[inline]
pub fn embedding_dimension(schema: &Schema) -> Option<usize> {
    schema
        .fields()
        .iter()
        .find(|field| field.name() == EMBEDDING_COLUMN)
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}
