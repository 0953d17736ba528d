
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum stored title length, in characters
pub const MAX_TITLE_CHARS: usize = 255;
/// Maximum stored body length, in characters
pub const MAX_BODY_CHARS: usize = 10_000;

/// A stored question or answer together with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Upstream question or answer ID, unique within its `is_question` partition
    pub source_id: i64,
    /// Owning question for answers, `0` for questions
    pub parent_id: i64,
    pub is_question: bool,
    /// Question title, empty for answers
    pub title: String,
    pub body: String,
    pub embedding: Vec<f32>,
}

/// Identity of a record without its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub source_id: i64,
    pub parent_id: i64,
    pub is_question: bool,
}

/// A retrieval hit. `score` is always "higher is better".
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub record: Record,
    pub score: f32,
}

/// Opaque identifier handed back by a store after an insert
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(RecordId),
    AlreadyPresent,
}

impl Record {
    /// Build a question record with an empty embedding, clamping text to the stored limits
    #[inline]
    pub fn question(source_id: i64, title: &str, body: &str) -> Self {
        Self {
            source_id,
            parent_id: 0,
            is_question: true,
            title: clamp_chars(title, MAX_TITLE_CHARS),
            body: clamp_chars(body, MAX_BODY_CHARS),
            embedding: Vec::new(),
        }
    }

    /// Build an answer record with an empty embedding
    #[inline]
    pub fn answer(source_id: i64, parent_id: i64, body: &str) -> Self {
        Self {
            source_id,
            parent_id,
            is_question: false,
            title: String::new(),
            body: clamp_chars(body, MAX_BODY_CHARS),
            embedding: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Text the embedding is computed from
    #[inline]
    pub fn embedding_text(&self) -> String {
        if self.is_question {
            format!("{}\n{}", self.title, self.body)
        } else {
            self.body.clone()
        }
    }

    #[inline]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            source_id: self.source_id,
            parent_id: self.parent_id,
            is_question: self.is_question,
        }
    }
}

impl RecordKey {
    /// Identifier for the `(source_id, is_question)` pair
    #[inline]
    pub fn record_id(&self) -> RecordId {
        let kind = if self.is_question { 'q' } else { 'a' };
        RecordId(format!("{}:{}", kind, self.source_id))
    }
}

impl RecordId {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RecordKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_question {
            write!(f, "question {}", self.source_id)
        } else {
            write!(f, "answer {} (question {})", self.source_id, self.parent_id)
        }
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point
#[inline]
pub fn clamp_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.get(..byte_index).unwrap_or(text).to_string(),
        None => text.to_string(),
    }
}

/// Cosine similarity, `0.0` when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
