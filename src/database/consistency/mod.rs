// Store consistency audit
// Checks the question/answer invariants over every stored record key

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::VectorStore;
use super::models::RecordKey;
use crate::Result;

/// Result of auditing a vector store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of stored records
    pub total: usize,
    pub questions: usize,
    pub answers: usize,
    /// Keys stored more than once, with their occurrence count
    pub duplicate_keys: Vec<(RecordKey, usize)>,
    /// Answers whose parent question is not stored
    pub orphaned_answers: Vec<RecordKey>,
    /// Questions without any stored answer
    pub unanswered_questions: Vec<i64>,
    /// No duplicates and no orphans
    pub is_consistent: bool,
}

/// Scan every record key in `store` and report invariant violations
#[inline]
pub async fn validate_consistency(store: &dyn VectorStore) -> Result<ConsistencyReport> {
    info!("Starting vector store consistency validation");

    let keys = store.list_keys().await?;
    debug!("Found {} records in vector store", keys.len());

    let report = ConsistencyReport::from_keys(&keys);

    if report.is_consistent {
        info!("Vector store consistency validation passed");
    } else {
        warn!("Vector store consistency validation found issues");
        log_consistency_issues(&report);
    }

    Ok(report)
}

impl ConsistencyReport {
    /// Build a report from a list of record keys
    #[inline]
    pub fn from_keys(keys: &[RecordKey]) -> Self {
        // Identity is (source_id, is_question); parent_id is payload
        let mut occurrences: HashMap<(i64, bool), (RecordKey, usize)> = HashMap::new();
        for key in keys {
            occurrences
                .entry((key.source_id, key.is_question))
                .or_insert((*key, 0))
                .1 += 1;
        }

        let mut duplicate_keys: Vec<(RecordKey, usize)> = occurrences
            .values()
            .filter(|(_, count)| *count > 1)
            .copied()
            .collect();
        duplicate_keys.sort();

        let question_ids: HashSet<i64> = keys
            .iter()
            .filter(|key| key.is_question)
            .map(|key| key.source_id)
            .collect();
        let answered: HashSet<i64> = keys
            .iter()
            .filter(|key| !key.is_question)
            .map(|key| key.parent_id)
            .collect();

        let mut orphaned_answers: Vec<RecordKey> = keys
            .iter()
            .filter(|key| !key.is_question && !question_ids.contains(&key.parent_id))
            .copied()
            .collect();
        orphaned_answers.sort();
        orphaned_answers.dedup();

        let mut unanswered_questions: Vec<i64> =
            question_ids.difference(&answered).copied().collect();
        unanswered_questions.sort_unstable();

        let questions = keys.iter().filter(|key| key.is_question).count();
        let is_consistent = duplicate_keys.is_empty() && orphaned_answers.is_empty();

        Self {
            total: keys.len(),
            questions,
            answers: keys.len() - questions,
            duplicate_keys,
            orphaned_answers,
            unanswered_questions,
            is_consistent,
        }
    }

    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Vector store is consistent: {} questions, {} answers ({} questions without answers)",
                self.questions,
                self.answers,
                self.unanswered_questions.len()
            )
        } else {
            format!(
                "Vector store inconsistencies found: {} duplicate records, {} orphaned answers",
                self.duplicate_keys.len(),
                self.orphaned_answers.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.duplicate_keys.len() + self.orphaned_answers.len()
    }
}

fn log_consistency_issues(report: &ConsistencyReport) {
    for (key, count) in &report.duplicate_keys {
        warn!("{} is stored {} times", key, count);
    }
    for key in &report.orphaned_answers {
        warn!("{} has no stored parent question", key);
    }
}
