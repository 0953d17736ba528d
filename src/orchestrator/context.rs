// Context and response assembly
// Turns ranked records into generation passages and linked sources

use serde::{Deserialize, Serialize};

use crate::database::{QueryResult, Record};

/// Final answer plus the records it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// A record used as context, with its canonical link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Question {
        question_id: i64,
        question_title: String,
        question_body: String,
        url: String,
    },
    Answer {
        answer_id: i64,
        parent_question_id: i64,
        answer_body: String,
        url: String,
    },
}

impl Source {
    #[inline]
    pub fn from_record(record: &Record, site_url: &str) -> Self {
        let site_url = site_url.trim_end_matches('/');
        if record.is_question {
            Self::Question {
                question_id: record.source_id,
                question_title: record.title.clone(),
                question_body: record.body.clone(),
                url: format!("{}/questions/{}", site_url, record.source_id),
            }
        } else {
            Self::Answer {
                answer_id: record.source_id,
                parent_question_id: record.parent_id,
                answer_body: record.body.clone(),
                url: format!("{}/a/{}", site_url, record.source_id),
            }
        }
    }

    #[inline]
    pub fn url(&self) -> &str {
        match self {
            Self::Question { url, .. } | Self::Answer { url, .. } => url,
        }
    }
}

/// Labeled passage handed to the generation provider
#[inline]
pub fn passage(record: &Record) -> String {
    if record.is_question {
        format!("Question: {}\n{}", record.title, record.body)
    } else {
        format!("Answer (to question {}): {}", record.parent_id, record.body)
    }
}

/// Passages and sources for the first `limit` results, in result order
#[inline]
pub fn assemble(
    results: &[QueryResult],
    limit: usize,
    site_url: &str,
) -> (Vec<String>, Vec<Source>) {
    results
        .iter()
        .take(limit)
        .map(|hit| (passage(&hit.record), Source::from_record(&hit.record, site_url)))
        .unzip()
}
