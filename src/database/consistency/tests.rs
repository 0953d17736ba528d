use super::*;
use crate::database::{InMemoryVectorStore, Record};

fn question_key(id: i64) -> RecordKey {
    RecordKey {
        source_id: id,
        parent_id: 0,
        is_question: true,
    }
}

fn answer_key(id: i64, parent_id: i64) -> RecordKey {
    RecordKey {
        source_id: id,
        parent_id,
        is_question: false,
    }
}

#[test]
fn empty_store_is_consistent() {
    let report = ConsistencyReport::from_keys(&[]);

    assert!(report.is_consistent);
    assert_eq!(report.total, 0);
    assert_eq!(report.total_issues(), 0);
    assert!(report.summary().contains("Vector store is consistent"));
}

#[test]
fn counts_questions_and_answers() {
    let keys = vec![question_key(42), answer_key(100, 42), answer_key(101, 42)];
    let report = ConsistencyReport::from_keys(&keys);

    assert!(report.is_consistent);
    assert_eq!(report.total, 3);
    assert_eq!(report.questions, 1);
    assert_eq!(report.answers, 2);
    assert!(report.unanswered_questions.is_empty());
}

#[test]
fn detects_duplicates_and_orphans() {
    let keys = vec![
        question_key(1),
        question_key(1),
        answer_key(10, 1),
        answer_key(20, 2),
    ];
    let report = ConsistencyReport::from_keys(&keys);

    assert!(!report.is_consistent);
    assert_eq!(report.duplicate_keys, vec![(question_key(1), 2)]);
    assert_eq!(report.orphaned_answers, vec![answer_key(20, 2)]);
    assert_eq!(report.total_issues(), 2);

    let summary = report.summary();
    assert!(summary.contains("1 duplicate records"));
    assert!(summary.contains("1 orphaned answers"));
}

#[test]
fn question_and_answer_with_same_id_are_distinct() {
    let keys = vec![question_key(5), answer_key(5, 5)];
    let report = ConsistencyReport::from_keys(&keys);

    assert!(report.is_consistent);
    assert!(report.duplicate_keys.is_empty());
}

#[test]
fn unanswered_questions_do_not_break_consistency() {
    let keys = vec![question_key(3), question_key(1), answer_key(7, 1)];
    let report = ConsistencyReport::from_keys(&keys);

    assert!(report.is_consistent);
    assert_eq!(report.unanswered_questions, vec![3]);
    assert!(report.summary().contains("1 questions without answers"));
}

#[tokio::test]
async fn validates_a_live_store() {
    let store = InMemoryVectorStore::new(2);
    store
        .insert(Record::question(42, "Title", "Body").with_embedding(vec![1.0, 0.0]))
        .await
        .expect("insert should succeed");
    store
        .insert(Record::answer(100, 42, "Answer").with_embedding(vec![0.0, 1.0]))
        .await
        .expect("insert should succeed");
    store
        .insert(Record::answer(200, 99, "Stray").with_embedding(vec![0.5, 0.5]))
        .await
        .expect("insert should succeed");

    let report = validate_consistency(&store)
        .await
        .expect("validation should succeed");

    assert!(!report.is_consistent);
    assert_eq!(report.orphaned_answers, vec![answer_key(200, 99)]);
    assert!(report.duplicate_keys.is_empty());
}
