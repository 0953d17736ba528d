// Query orchestrator module
// Retrieval, backfill from the knowledge source, and answer generation for one query

pub mod context;


use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use itertools::Itertools;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{InsertOutcome, QueryResult, Record, VectorStore};
use crate::embeddings::EmbeddingProvider;
use crate::generation::GenerationProvider;
use crate::knowledge::{AnswerCandidate, KnowledgeSource, QuestionCandidate};
use crate::{Result, StackRagError};

pub use context::{AskResponse, Source, assemble, passage};

/// Decides whether initial search results are good enough to skip backfill
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SufficiencyPolicy {
    /// Any hit at all is sufficient
    NonEmpty,
    /// The best hit must score at least this much
    MinScore(f32),
}

impl SufficiencyPolicy {
    #[inline]
    pub fn from_min_score(min_score: Option<f32>) -> Self {
        min_score.map_or(Self::NonEmpty, Self::MinScore)
    }

    /// `results` must be ordered best first
    #[inline]
    pub fn is_sufficient(&self, results: &[QueryResult]) -> bool {
        match (self, results.first()) {
            (_, None) => false,
            (Self::NonEmpty, Some(_)) => true,
            (Self::MinScore(threshold), Some(best)) => best.score >= *threshold,
        }
    }
}

impl fmt::Display for SufficiencyPolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmpty => f.write_str("backfill only when no results are found"),
            Self::MinScore(threshold) => {
                write!(f, "backfill when the best score is below {}", threshold)
            }
        }
    }
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub context_size: usize,
    pub policy: SufficiencyPolicy,
    pub backfill_concurrency: usize,
    pub site_url: String,
    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
    pub store_timeout: Duration,
    pub knowledge_timeout: Duration,
}

impl OrchestratorSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            context_size: config.retrieval.context_size,
            policy: SufficiencyPolicy::from_min_score(config.retrieval.min_score),
            backfill_concurrency: config.retrieval.backfill_concurrency,
            site_url: config.stackexchange.site_url.clone(),
            embedding_timeout: config.timeouts.embedding(),
            generation_timeout: config.timeouts.generation(),
            store_timeout: config.timeouts.store(),
            knowledge_timeout: config.timeouts.knowledge(),
        }
    }
}

impl Default for OrchestratorSettings {
    #[inline]
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One incoming query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AskRequest {
    pub query: String,
    /// Falls back to the configured `top_k`
    pub top_k: Option<usize>,
}

impl AskRequest {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Store mutations performed while answering one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    pub questions_inserted: usize,
    pub questions_existing: usize,
    pub answers_inserted: usize,
    pub answers_existing: usize,
    /// Candidates dropped because their answers could not be fetched
    pub candidates_skipped: usize,
    pub insert_failures: usize,
    /// Stored questions that received their missing answers
    pub repaired: usize,
}

impl IngestStats {
    #[inline]
    pub fn records_inserted(&self) -> usize {
        self.questions_inserted + self.answers_inserted
    }

    fn merge(&mut self, other: Self) {
        self.questions_inserted += other.questions_inserted;
        self.questions_existing += other.questions_existing;
        self.answers_inserted += other.answers_inserted;
        self.answers_existing += other.answers_existing;
        self.candidates_skipped += other.candidates_skipped;
        self.insert_failures += other.insert_failures;
        self.repaired += other.repaired;
    }
}

/// A response together with the ingestion it caused
#[derive(Debug, Clone, PartialEq)]
pub struct Answered {
    pub response: AskResponse,
    pub stats: IngestStats,
}

struct Retrieval {
    results: Vec<QueryResult>,
    stats: IngestStats,
}

/// Answers queries from the vector store, backfilling from the knowledge source.
///
/// Holds no per-query state; every clone shares the same collaborators.
#[derive(Clone)]
pub struct QueryOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    knowledge: Arc<dyn KnowledgeSource>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationProvider>,
    settings: Arc<OrchestratorSettings>,
}

impl QueryOrchestrator {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        knowledge: Arc<dyn KnowledgeSource>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        info!("Sufficiency policy: {}", settings.policy);
        if store.supports_conditional_insert() {
            debug!("Vector store supports conditional insert");
        } else {
            warn!(
                "Vector store lacks conditional insert; concurrent backfills may duplicate records"
            );
        }

        Self {
            embedder,
            knowledge,
            store,
            generator,
            settings: Arc::new(settings),
        }
    }

    #[inline]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Answer one query
    #[inline]
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        self.answer(request).await.map(|answered| answered.response)
    }

    /// Answer one query and report what was ingested on the way.
    ///
    /// Retrieval and ingestion run on a spawned task, so dropping this future
    /// after the query is embedded does not abort store writes in flight.
    #[inline]
    pub async fn answer(&self, request: AskRequest) -> Result<Answered> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(StackRagError::InvalidRequest(
                "Query must not be empty".to_string(),
            ));
        }
        let top_k = request.top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(StackRagError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }

        info!("Answering query (top_k: {})", top_k);
        let query_vector = self.embed(&query).await.inspect_err(|e| {
            error!("Failed to embed query: {}", e);
        })?;

        let this = self.clone();
        let task_query = query.clone();
        let retrieval = tokio::spawn(async move {
            this.retrieve(&task_query, &query_vector, top_k).await
        })
        .await
        .map_err(|e| StackRagError::Other(anyhow::anyhow!("Retrieval task failed: {}", e)))??;

        let stats = retrieval.stats;
        if stats != IngestStats::default() {
            info!("Ingestion finished: {:?}", stats);
        }

        let limit = self.settings.context_size.min(top_k);
        let (passages, sources) = assemble(&retrieval.results, limit, &self.settings.site_url);
        debug!("Assembled {} context passages", passages.len());

        let answer = self.generate(&query, &passages).await.inspect_err(|e| {
            error!("Failed to generate answer: {}", e);
        })?;

        Ok(Answered {
            response: AskResponse { answer, sources },
            stats,
        })
    }

    async fn retrieve(
        &self,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Retrieval> {
        let results = self.search(query_vector, top_k).await?;

        if self.settings.policy.is_sufficient(&results) {
            debug!("Initial results sufficient ({} hits)", results.len());
            return self.repair(query_vector, top_k, results).await;
        }

        info!(
            "Initial results insufficient ({} hits), backfilling from knowledge source",
            results.len()
        );
        self.backfill(query, query_vector, top_k, results).await
    }

    /// Ingest remote candidates for a query, then search again
    async fn backfill(
        &self,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
        results: Vec<QueryResult>,
    ) -> Result<Retrieval> {
        let candidates = match self.search_questions(query).await {
            Ok(candidates) => candidates,
            Err(e) if results.is_empty() => {
                error!("Knowledge source search failed with no local results: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Knowledge source search failed, keeping {} local results: {}",
                    results.len(),
                    e
                );
                return Ok(Retrieval {
                    results,
                    stats: IngestStats::default(),
                });
            }
        };

        let total = candidates.len();
        let candidates: Vec<QuestionCandidate> =
            candidates.into_iter().unique_by(|c| c.id).collect();
        if candidates.len() < total {
            debug!(
                "Dropped {} duplicate candidates",
                total - candidates.len()
            );
        }

        if candidates.is_empty() {
            info!("Knowledge source returned no candidates");
            return Ok(Retrieval {
                results,
                stats: IngestStats::default(),
            });
        }

        info!("Backfilling {} candidate questions", candidates.len());
        let stats = stream::iter(candidates)
            .map(|candidate| self.backfill_candidate(candidate))
            .buffered(self.settings.backfill_concurrency.max(1))
            .try_fold(IngestStats::default(), |mut acc, stats| async move {
                acc.merge(stats);
                Ok(acc)
            })
            .await?;

        let results = self.search(query_vector, top_k).await?;
        debug!("Search after backfill returned {} hits", results.len());
        Ok(Retrieval { results, stats })
    }

    /// Ingest one candidate question with all of its answers
    async fn backfill_candidate(&self, candidate: QuestionCandidate) -> Result<IngestStats> {
        if self.store.supports_conditional_insert() {
            self.backfill_conditional(candidate).await
        } else {
            self.backfill_checked(candidate).await
        }
    }

    /// Claim the question first; its answers are fetched only when it is new or unanswered
    async fn backfill_conditional(&self, candidate: QuestionCandidate) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let question = Record::question(candidate.id, &candidate.title, &candidate.body);

        match self.put_record(question).await? {
            Some(InsertOutcome::Inserted(id)) => {
                debug!("Inserted {}", id);
                stats.questions_inserted += 1;
                let answers = match self.fetch_answers(candidate.id).await {
                    Ok(answers) => answers,
                    Err(e) => {
                        warn!("Question {} stored without answers: {}", candidate.id, e);
                        stats.candidates_skipped += 1;
                        return Ok(stats);
                    }
                };
                stats.merge(self.insert_answers(candidate.id, &answers).await?);
            }
            Some(InsertOutcome::AlreadyPresent) => {
                debug!("Question {} already stored", candidate.id);
                stats.questions_existing += 1;
                stats.merge(self.complete_answers(candidate.id).await?);
            }
            None => {
                warn!(
                    "Not storing answers of question {} after its insert failed",
                    candidate.id
                );
                stats.insert_failures += 1;
            }
        }

        Ok(stats)
    }

    /// Check-then-insert path for stores without an atomic conditional insert
    async fn backfill_checked(&self, candidate: QuestionCandidate) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        if self.exists(candidate.id, true).await? {
            debug!("Question {} already stored", candidate.id);
            stats.questions_existing += 1;
            stats.merge(self.complete_answers(candidate.id).await?);
            return Ok(stats);
        }

        let answers = match self.fetch_answers(candidate.id).await {
            Ok(answers) => answers,
            Err(e) => {
                warn!("Skipping question {}: {}", candidate.id, e);
                stats.candidates_skipped += 1;
                return Ok(stats);
            }
        };

        let question = Record::question(candidate.id, &candidate.title, &candidate.body);
        match self.put_record(question).await? {
            Some(InsertOutcome::Inserted(id)) => {
                debug!("Inserted {} with {} answers pending", id, answers.len());
                stats.questions_inserted += 1;
                stats.merge(self.insert_answers(candidate.id, &answers).await?);
            }
            Some(InsertOutcome::AlreadyPresent) => stats.questions_existing += 1,
            None => {
                warn!(
                    "Not storing answers of question {} after its insert failed",
                    candidate.id
                );
                stats.insert_failures += 1;
            }
        }

        Ok(stats)
    }

    /// Fetch and store answers for stored questions in `results` that have none
    async fn repair(
        &self,
        query_vector: &[f32],
        top_k: usize,
        results: Vec<QueryResult>,
    ) -> Result<Retrieval> {
        let question_ids: Vec<i64> = results
            .iter()
            .filter(|hit| hit.record.is_question)
            .map(|hit| hit.record.source_id)
            .unique()
            .collect();

        let mut stats = IngestStats::default();
        for question_id in question_ids {
            stats.merge(self.complete_answers(question_id).await?);
        }

        if stats.answers_inserted == 0 {
            return Ok(Retrieval { results, stats });
        }

        info!("Repaired {} questions, searching again", stats.repaired);
        let results = self.search(query_vector, top_k).await?;
        Ok(Retrieval { results, stats })
    }

    /// Store the answers of a stored question unless it already has some
    async fn complete_answers(&self, question_id: i64) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        if self.has_children(question_id).await? {
            return Ok(stats);
        }

        let answers = match self.fetch_answers(question_id).await {
            Ok(answers) => answers,
            Err(e) => {
                warn!("Could not fetch answers for question {}: {}", question_id, e);
                stats.candidates_skipped += 1;
                return Ok(stats);
            }
        };
        if answers.is_empty() {
            debug!("Question {} has no upstream answers", question_id);
            return Ok(stats);
        }

        stats.merge(self.insert_answers(question_id, &answers).await?);
        if stats.answers_inserted > 0 {
            stats.repaired += 1;
        }
        Ok(stats)
    }

    async fn insert_answers(
        &self,
        question_id: i64,
        answers: &[AnswerCandidate],
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        for answer in answers {
            let record = Record::answer(answer.id, question_id, &answer.body);
            match self.store_record(record).await? {
                Some(InsertOutcome::Inserted(_)) => stats.answers_inserted += 1,
                Some(InsertOutcome::AlreadyPresent) => stats.answers_existing += 1,
                None => stats.insert_failures += 1,
            }
        }
        Ok(stats)
    }

    /// Store a record unless it is already present
    async fn store_record(&self, record: Record) -> Result<Option<InsertOutcome>> {
        if !self.store.supports_conditional_insert()
            && self.exists(record.source_id, record.is_question).await?
        {
            return Ok(Some(InsertOutcome::AlreadyPresent));
        }
        self.put_record(record).await
    }

    /// Embed and insert a record without a separate existence lookup.
    ///
    /// `None` means the insert itself failed; that is logged and left to a later repair.
    async fn put_record(&self, record: Record) -> Result<Option<InsertOutcome>> {
        let embedding = self.embed(&record.embedding_text()).await.inspect_err(|e| {
            error!("Failed to embed {}: {}", record.key(), e);
        })?;
        let record = record.with_embedding(embedding);
        let key = record.key();

        let outcome = if self.store.supports_conditional_insert() {
            with_deadline(
                self.settings.store_timeout,
                StackRagError::Store,
                "store insert",
                self.store.insert_if_absent(record),
            )
            .await
        } else {
            with_deadline(
                self.settings.store_timeout,
                StackRagError::Store,
                "store insert",
                self.store.insert(record),
            )
            .await
            .map(InsertOutcome::Inserted)
        };

        match outcome {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                warn!("Failed to store {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_deadline(
            self.settings.embedding_timeout,
            StackRagError::Embedding,
            "embedding",
            self.embedder.embed(text),
        )
        .await
    }

    /// Search the store, best score first
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        let mut results = with_deadline(
            self.settings.store_timeout,
            StackRagError::Store,
            "store search",
            self.store.search(vector, top_k),
        )
        .await?;
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn exists(&self, source_id: i64, is_question: bool) -> Result<bool> {
        with_deadline(
            self.settings.store_timeout,
            StackRagError::Store,
            "store lookup",
            self.store.exists(source_id, is_question),
        )
        .await
    }

    async fn has_children(&self, parent_id: i64) -> Result<bool> {
        with_deadline(
            self.settings.store_timeout,
            StackRagError::Store,
            "store lookup",
            self.store.has_children(parent_id),
        )
        .await
    }

    async fn search_questions(&self, query: &str) -> Result<Vec<QuestionCandidate>> {
        with_deadline(
            self.settings.knowledge_timeout,
            StackRagError::RemoteFetch,
            "knowledge source search",
            self.knowledge.search_questions(query),
        )
        .await
    }

    async fn fetch_answers(&self, question_id: i64) -> Result<Vec<AnswerCandidate>> {
        with_deadline(
            self.settings.knowledge_timeout,
            StackRagError::RemoteFetch,
            "answer fetch",
            self.knowledge.fetch_answers(question_id),
        )
        .await
    }

    async fn generate(&self, query: &str, passages: &[String]) -> Result<String> {
        with_deadline(
            self.settings.generation_timeout,
            StackRagError::Generation,
            "generation",
            self.generator.generate(query, passages),
        )
        .await
    }
}

/// Bound a collaborator call; a timeout becomes that collaborator's error
async fn with_deadline<T, F>(
    limit: Duration,
    as_error: fn(String) -> StackRagError,
    operation: &str,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", operation, limit);
            Err(as_error(format!("{} timed out after {:?}", operation, limit)))
        }
    }
}
