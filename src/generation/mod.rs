// Answer generation
// Prompt construction and chat-model providers


use async_trait::async_trait;
use tracing::debug;

use crate::ollama::{OllamaClient, SYSTEM_PROMPT};
use crate::{Result, StackRagError};

/// Maps a query plus ordered context passages to an answer
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// `passages` are most relevant first
    async fn generate(&self, query: &str, passages: &[String]) -> Result<String>;
}

/// Render the user prompt sent to the chat model
#[inline]
pub fn build_prompt(query: &str, passages: &[String]) -> String {
    let context = if passages.is_empty() {
        "No related posts were found.".to_string()
    } else {
        passages.join("\n\n")
    };

    format!(
        "You are a helpful assistant that answers StackOverflow-style programming questions.\n\n\
         Here are some related posts:\n\
         {context}\n\n\
         Based on the information above, provide a clear and helpful answer to the following user question:\n\n\
         User Question: {query}\n\
         Answer:"
    )
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    async fn generate(&self, query: &str, passages: &[String]) -> Result<String> {
        let prompt = build_prompt(query, passages);
        debug!(
            "Generating answer from {} passages (prompt length: {})",
            passages.len(),
            prompt.len()
        );

        let client = self.clone();
        tokio::task::spawn_blocking(move || client.chat(SYSTEM_PROMPT, &prompt))
            .await
            .map_err(|e| StackRagError::Generation(format!("Generation task failed: {}", e)))?
            .map_err(|e| StackRagError::Generation(format!("{:#}", e)))
    }
}
