// Knowledge source module
// Remote question and answer lookup used to backfill the vector store

pub mod stackexchange;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use stackexchange::StackExchangeClient;

/// A remote question offered for ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCandidate {
    pub id: i64,
    pub title: String,
    pub body: String,
}

/// A remote answer belonging to a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    pub id: i64,
    pub body: String,
    pub accepted: bool,
    pub score: i64,
}

/// Remote source of questions and their answers
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Candidate questions in the remote system's relevance order, possibly empty
    async fn search_questions(&self, query: &str) -> Result<Vec<QuestionCandidate>>;

    /// Every known answer for `question_id`. Failures are `RemoteFetch` errors.
    async fn fetch_answers(&self, question_id: i64) -> Result<Vec<AnswerCandidate>>;
}
