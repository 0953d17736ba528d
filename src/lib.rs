use thiserror::Error;

pub type Result<T> = std::result::Result<T, StackRagError>;

#[derive(Error, Debug)]
pub enum StackRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Remote fetch error: {0}")]
    RemoteFetch(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Caller-facing classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    QueryUnderstanding,
    ExternalKnowledge,
    AnswerGeneration,
    Storage,
    Internal,
}

impl StackRagError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Embedding(_) => ErrorKind::QueryUnderstanding,
            Self::RemoteFetch(_) => ErrorKind::ExternalKnowledge,
            Self::Generation(_) => ErrorKind::AnswerGeneration,
            Self::Store(_) => ErrorKind::Storage,
            Self::Config(_) | Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Short explanation suitable for printing to an end user
    #[inline]
    pub fn user_message(&self) -> String {
        let summary = match self.kind() {
            ErrorKind::InvalidRequest => "The request was rejected",
            ErrorKind::QueryUnderstanding => "We could not understand or embed your query",
            ErrorKind::ExternalKnowledge => "We could not reach the external knowledge source",
            ErrorKind::AnswerGeneration => "We could not generate an answer",
            ErrorKind::Storage => "The local question store is unavailable",
            ErrorKind::Internal => "An internal error occurred",
        };
        format!("{}: {}", summary, self)
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod knowledge;
pub mod ollama;
pub mod orchestrator;
