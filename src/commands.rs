use console::style;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::database::{LanceVectorStore, VectorStore, validate_consistency};
use crate::knowledge::StackExchangeClient;
use crate::ollama::OllamaClient;
use crate::orchestrator::{
    AskRequest, AskResponse, OrchestratorSettings, QueryOrchestrator, Source,
};
use crate::{Result, StackRagError};

/// Load and validate the configuration stored in `config_dir`
#[inline]
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load(config_dir)
        .map_err(|e| StackRagError::Config(format!("{:#}", e)))?;
    config
        .validate()
        .map_err(|e| StackRagError::Config(e.to_string()))?;
    Ok(config)
}

/// Wire the LanceDB store, Ollama and StackExchange into an orchestrator
#[inline]
pub async fn build_orchestrator(config: &Config) -> Result<QueryOrchestrator> {
    let ollama = Arc::new(
        OllamaClient::new(config)
            .map_err(|e| StackRagError::Config(format!("{:#}", e)))?
            .with_timeout(config.timeouts.generation()),
    );
    let knowledge = Arc::new(
        StackExchangeClient::new(config)
            .map_err(|e| StackRagError::Config(format!("{:#}", e)))?,
    );
    let store = Arc::new(LanceVectorStore::new(config).await?);

    Ok(QueryOrchestrator::new(
        Arc::<OllamaClient>::clone(&ollama),
        knowledge,
        store,
        ollama,
        OrchestratorSettings::from_config(config),
    ))
}

/// Answer one question and print the result
#[inline]
pub async fn ask(
    config_dir: &Path,
    query: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_dir)?;
    let orchestrator = build_orchestrator(&config).await?;

    let request = AskRequest { query, top_k };
    let answered = orchestrator.answer(request).await?;
    info!(
        "Answered with {} sources, {} records ingested",
        answered.response.sources.len(),
        answered.stats.records_inserted()
    );

    if json {
        let rendered = serde_json::to_string_pretty(&answered.response)
            .map_err(|e| StackRagError::Other(e.into()))?;
        println!("{}", rendered);
    } else {
        println!("{}", render_response(&answered.response));
    }

    Ok(())
}

/// Human-readable answer followed by its numbered sources
#[inline]
pub fn render_response(response: &AskResponse) -> String {
    let mut output = response.answer.trim_end().to_string();

    if response.sources.is_empty() {
        output.push_str("\n\nNo related posts were found.");
        return output;
    }

    output.push_str("\n\nSources:");
    for (index, source) in response.sources.iter().enumerate() {
        let label = match source {
            Source::Question {
                question_id,
                question_title,
                ..
            } => format!("Question {}: {}", question_id, question_title),
            Source::Answer {
                answer_id,
                parent_question_id,
                ..
            } => format!("Answer {} to question {}", answer_id, parent_question_id),
        };
        let _ = write!(output, "\n  [{}] {} ({})", index + 1, label, source.url());
    }

    output
}

/// Report collaborator health and store contents
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;

    println!("{}", style("📊 stackrag Status Report").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config) {
        Ok(client) => {
            let health = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .map_err(|e| StackRagError::Other(e.into()))?;
            match health {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Embedding model: {}", config.ollama.model);
                    println!("   💬 Chat model: {}", config.ollama.chat_model);
                }
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: Failed to connect - {:#}", e),
    }

    println!();
    println!("🌐 StackExchange Status:");
    match StackExchangeClient::new(&config) {
        Ok(client) => {
            let health = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .map_err(|e| StackRagError::Other(e.into()))?;
            match health {
                Ok(()) => println!(
                    "   ✅ API reachable for site {}",
                    config.stackexchange.site
                ),
                Err(e) => println!("   ❌ API unreachable - {:#}", e),
            }
        }
        Err(e) => println!("   ❌ Invalid API configuration - {:#}", e),
    }

    println!();
    println!("🔍 Vector Store Status:");
    let store = match LanceVectorStore::new(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open vector store: {}", e);
            println!("   ❌ LanceDB: Failed to open - {}", e);
            return Ok(());
        }
    };
    println!(
        "   ✅ LanceDB: {} ({} dimensions)",
        config.vector_database_path().display(),
        store.vector_dimension()
    );
    match store.count().await {
        Ok(count) => println!("   📊 Records: {}", count),
        Err(e) => println!("   ⚠️  Could not count records - {}", e),
    }

    println!();
    println!("🧮 Store Consistency:");
    match validate_consistency(&store).await {
        Ok(report) => {
            let marker = if report.is_consistent { "✅" } else { "⚠️ " };
            println!("   {} {}", marker, report.summary());
            for (key, count) in &report.duplicate_keys {
                println!("   🔁 {} stored {} times", key, count);
            }
            for key in &report.orphaned_answers {
                println!("   👻 Orphaned {}", key);
            }
        }
        Err(e) => println!("   ❌ Failed to check consistency: {}", e),
    }

    Ok(())
}
