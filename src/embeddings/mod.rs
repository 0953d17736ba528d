// Embeddings module
// Text to vector providers


use async_trait::async_trait;
use tracing::debug;

use crate::ollama::OllamaClient;
use crate::{Result, StackRagError};

/// Maps text to a fixed-dimension vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector returned by `embed`
    fn dimension(&self) -> usize;
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        let embedding = tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .map_err(|e| StackRagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| StackRagError::Embedding(format!("{:#}", e)))?;

        debug!("Embedded text into {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension()
    }
}
