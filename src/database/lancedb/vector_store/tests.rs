use super::*;
use tempfile::TempDir;

const DIM: usize = 5;

fn vector(seed: f32) -> Vec<f32> {
    (0..DIM).map(|i| seed.mul_add(0.1, i as f32 * 0.01)).collect()
}

fn question(id: i64, embedding: Vec<f32>) -> Record {
    Record::question(id, &format!("Question {id}"), "How do I do this?").with_embedding(embedding)
}

fn answer(id: i64, parent_id: i64, embedding: Vec<f32>) -> Record {
    Record::answer(id, parent_id, "Like this.").with_embedding(embedding)
}

async fn open_store() -> (LanceVectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = LanceVectorStore::open(&temp_dir.path().join("vectors"), DIM)
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

#[tokio::test]
async fn new_store_uses_configured_path_and_dimension() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path().to_path_buf());
    config.ollama.embedding_dimension = DIM as u32;

    let store = LanceVectorStore::new(&config)
        .await
        .expect("should create vector store");

    assert_eq!(store.table_name, TABLE_NAME);
    assert_eq!(store.vector_dimension(), DIM);
    assert!(config.vector_database_path().exists());
}

#[tokio::test]
async fn empty_table_searches_to_nothing() {
    let (store, _temp_dir) = open_store().await;

    let results = store
        .search(&vector(1.0), 5)
        .await
        .expect("search should succeed");
    assert!(results.is_empty());
    assert_eq!(store.count().await.expect("count should succeed"), 0);
}

#[tokio::test]
async fn insert_then_exists_and_children() {
    let (store, _temp_dir) = open_store().await;

    let id = store
        .insert(question(42, vector(1.0)))
        .await
        .expect("insert should succeed");
    assert_eq!(id.as_str(), "q:42");

    assert!(store.exists(42, true).await.expect("exists should succeed"));
    assert!(!store.exists(42, false).await.expect("exists should succeed"));
    assert!(!store.has_children(42).await.expect("has_children should succeed"));

    store
        .insert(answer(100, 42, vector(2.0)))
        .await
        .expect("insert should succeed");
    assert!(store.has_children(42).await.expect("has_children should succeed"));
    assert!(store.exists(100, false).await.expect("exists should succeed"));
    assert_eq!(store.count().await.expect("count should succeed"), 2);
}

#[tokio::test]
async fn search_returns_best_match_first_with_similarity_scores() {
    let (store, _temp_dir) = open_store().await;

    let mut near = vec![0.0; DIM];
    near[0] = 1.0;
    let mut far = vec![0.0; DIM];
    far[DIM - 1] = 1.0;

    store
        .insert(question(1, far.clone()))
        .await
        .expect("insert should succeed");
    store
        .insert(question(2, near.clone()))
        .await
        .expect("insert should succeed");

    let results = store.search(&near, 2).await.expect("search should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.source_id, 2);
    assert!(results[0].score > results[1].score);
    assert!((results[0].score - 1.0).abs() < 1e-4);
    assert_eq!(results[0].record.title, "Question 2");
    assert_eq!(results[0].record.embedding.len(), DIM);
}

#[tokio::test]
async fn search_respects_limit() {
    let (store, _temp_dir) = open_store().await;
    for id in 1..=4 {
        store
            .insert(question(id, vector(id as f32)))
            .await
            .expect("insert should succeed");
    }

    let results = store
        .search(&vector(2.0), 3)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn insert_rejects_wrong_dimension() {
    let (store, _temp_dir) = open_store().await;

    let result = store.insert(question(1, vec![1.0, 2.0])).await;
    assert!(matches!(result, Err(StackRagError::Store(_))));
    assert_eq!(store.count().await.expect("count should succeed"), 0);
}

#[tokio::test]
async fn insert_if_absent_is_conditional() {
    let (store, _temp_dir) = open_store().await;
    assert!(store.supports_conditional_insert());

    let first = store
        .insert_if_absent(question(7, vector(1.0)))
        .await
        .expect("insert should succeed");
    assert!(matches!(first, InsertOutcome::Inserted(_)));

    let second = store
        .insert_if_absent(question(7, vector(3.0)))
        .await
        .expect("insert should succeed");
    assert_eq!(second, InsertOutcome::AlreadyPresent);
    assert_eq!(store.count().await.expect("count should succeed"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_conditional_inserts_store_one_record() {
    let (store, _temp_dir) = open_store().await;
    let store = Arc::new(store);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.insert_if_absent(question(11, vector(1.0))).await })
        })
        .collect();

    let mut inserted = 0;
    for task in tasks {
        let outcome = task
            .await
            .expect("task should join")
            .expect("insert should succeed");
        if matches!(outcome, InsertOutcome::Inserted(_)) {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(store.count().await.expect("count should succeed"), 1);
}

#[tokio::test]
async fn list_keys_covers_every_record() {
    let (store, _temp_dir) = open_store().await;
    store
        .insert(question(1, vector(1.0)))
        .await
        .expect("insert should succeed");
    store
        .insert(answer(10, 1, vector(2.0)))
        .await
        .expect("insert should succeed");

    let mut keys = store.list_keys().await.expect("list_keys should succeed");
    keys.sort();
    assert_eq!(
        keys,
        vec![
            RecordKey {
                source_id: 1,
                parent_id: 0,
                is_question: true,
            },
            RecordKey {
                source_id: 10,
                parent_id: 1,
                is_question: false,
            },
        ]
    );
}

#[tokio::test]
async fn reopening_keeps_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    {
        let store = LanceVectorStore::open(&path, DIM)
            .await
            .expect("should open vector store");
        store
            .insert(question(3, vector(1.0)))
            .await
            .expect("insert should succeed");
    }

    let reopened = LanceVectorStore::open(&path, DIM)
        .await
        .expect("should reopen vector store");
    assert!(reopened.exists(3, true).await.expect("exists should succeed"));
}

#[tokio::test]
async fn reopening_with_other_dimension_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    LanceVectorStore::open(&path, DIM)
        .await
        .expect("should open vector store");

    let result = LanceVectorStore::open(&path, DIM + 1).await;
    assert!(matches!(result, Err(StackRagError::Config(_))));
}
