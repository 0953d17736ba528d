#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{AnswerCandidate, KnowledgeSource, QuestionCandidate};
use crate::StackRagError;
use crate::config::Config;

/// Blocking client for the StackExchange 2.3 API.
///
/// Every call is a single attempt; retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct StackExchangeClient {
    api_url: Url,
    site: String,
    api_key: Option<String>,
    page_size: u32,
    agent: ureq::Agent,
}

/// Common wrapper around every API response
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    items: Vec<T>,
    quota_remaining: Option<i64>,
    backoff: Option<u64>,
    error_id: Option<i64>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    question_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct AnswerItem {
    answer_id: i64,
    #[serde(default)]
    body: String,
    #[serde(default)]
    is_accepted: bool,
    #[serde(default)]
    score: i64,
}

#[derive(Debug, Deserialize)]
struct SiteInfo {}

impl StackExchangeClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_url = config
            .stackexchange
            .api_base_url()
            .context("Failed to parse StackExchange API URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeouts.knowledge()))
            .build()
            .into();

        Ok(Self {
            api_url,
            site: config.stackexchange.site.clone(),
            api_key: config.stackexchange.api_key.clone(),
            page_size: config.stackexchange.max_candidates,
            agent,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Search questions by relevance, bodies included
    #[inline]
    pub fn search(&self, query: &str) -> Result<Vec<QuestionCandidate>> {
        let page_size = self.page_size.to_string();
        let url = self.endpoint(
            "search/advanced",
            &[
                ("order", "desc"),
                ("sort", "relevance"),
                ("q", query),
                ("filter", "withbody"),
                ("pagesize", &page_size),
            ],
        )?;

        let envelope: Envelope<QuestionItem> = self.get(&url)?;
        let questions: Vec<QuestionCandidate> = envelope
            .items
            .into_iter()
            .map(|item| QuestionCandidate {
                id: item.question_id,
                title: item.title,
                body: item.body,
            })
            .collect();

        info!(
            "StackExchange search returned {} questions",
            questions.len()
        );
        Ok(questions)
    }

    /// Answers for one question, highest voted first
    #[inline]
    pub fn answers(&self, question_id: i64) -> Result<Vec<AnswerCandidate>> {
        let url = self.endpoint(
            &format!("questions/{}/answers", question_id),
            &[("order", "desc"), ("sort", "votes"), ("filter", "withbody")],
        )?;

        let envelope: Envelope<AnswerItem> = self.get(&url)?;
        let answers: Vec<AnswerCandidate> = envelope
            .items
            .into_iter()
            .map(|item| AnswerCandidate {
                id: item.answer_id,
                body: item.body,
                accepted: item.is_accepted,
                score: item.score,
            })
            .collect();

        debug!(
            "Fetched {} answers for question {}",
            answers.len(),
            question_id
        );
        Ok(answers)
    }

    /// Check that the API answers for the configured site
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = self.endpoint("info", &[])?;
        let _info: Envelope<SiteInfo> = self.get(&url)?;
        info!("StackExchange API reachable for site {}", self.site);
        Ok(())
    }

    fn endpoint(&self, relative: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .api_url
            .join(relative)
            .with_context(|| format!("Failed to build URL for {}", relative))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("site", &self.site);
            if let Some(key) = &self.api_key {
                pairs.append_pair("key", key);
            }
        }

        Ok(url)
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &Url) -> Result<Envelope<T>> {
        debug!("GET {}", redact_key(url));

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    anyhow::anyhow!("StackExchange API returned HTTP {}", status)
                }
                other => anyhow::anyhow!("StackExchange request failed: {}", other),
            })?;

        let envelope: Envelope<T> = serde_json::from_str(&response_text)
            .context("Failed to parse StackExchange response")?;

        if let Some(error_id) = envelope.error_id {
            return Err(anyhow::anyhow!(
                "StackExchange API error {}: {}",
                error_id,
                envelope.error_message.as_deref().unwrap_or("unknown error")
            ));
        }

        if let Some(backoff) = envelope.backoff {
            warn!(
                "StackExchange asked clients to back off for {} seconds",
                backoff
            );
        }
        if let Some(quota) = envelope.quota_remaining {
            debug!("StackExchange quota remaining: {}", quota);
        }

        Ok(envelope)
    }
}

fn redact_key(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "key" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[async_trait]
impl KnowledgeSource for StackExchangeClient {
    async fn search_questions(&self, query: &str) -> crate::Result<Vec<QuestionCandidate>> {
        let client = self.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || client.search(&query))
            .await
            .map_err(|e| StackRagError::RemoteFetch(format!("Search task failed: {}", e)))?
            .map_err(|e| StackRagError::RemoteFetch(format!("{:#}", e)))
    }

    async fn fetch_answers(&self, question_id: i64) -> crate::Result<Vec<AnswerCandidate>> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.answers(question_id))
            .await
            .map_err(|e| StackRagError::RemoteFetch(format!("Answer fetch task failed: {}", e)))?
            .map_err(|e| StackRagError::RemoteFetch(format!("{:#}", e)))
    }
}
