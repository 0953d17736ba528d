use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn config_for(server: &MockServer, embedding_dimension: u32) -> Config {
    let uri = Url::parse(&server.uri()).expect("mock server uri should parse");
    Config {
        ollama: OllamaConfig {
            host: uri.host_str().unwrap_or("127.0.0.1").to_string(),
            port: uri.port().unwrap_or(80),
            model: "embed-model".to_string(),
            chat_model: "chat-model".to_string(),
            embedding_dimension,
            retry_attempts: 1,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

fn client_for(server: &MockServer, embedding_dimension: u32) -> OllamaClient {
    OllamaClient::new(&config_for(server, embedding_dimension)).expect("should create client")
}

async fn run_blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task should join")
}

#[test]
fn client_configuration() {
    let config = Config {
        ollama: OllamaConfig {
            host: "test-host".to_string(),
            port: 1234,
            model: "test-model".to_string(),
            chat_model: "test-chat".to_string(),
            retry_attempts: 4,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.chat_model, "test-chat");
    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.retry_attempts, 4);
    assert_eq!(client.embedding_dimension(), 768);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&Config::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(0);

    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn model_names_match_with_implicit_latest_tag() {
    assert!(model_matches("llama3.2:latest", "llama3.2:latest"));
    assert!(model_matches("llama3.2:latest", "llama3.2"));
    assert!(!model_matches("llama3.2:1b", "llama3.2"));
    assert!(!model_matches("mistral:latest", "llama3.2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_embedding_returns_first_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "embed-model",
            "input": "How do I reverse a list?"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [vec![0.5_f32; 64]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    let embedding = run_blocking(move || client.generate_embedding("How do I reverse a list?"))
        .await
        .expect("embedding should succeed");

    assert_eq!(embedding.len(), 64);
    assert!(embedding.iter().all(|v| (*v - 0.5).abs() < f32::EPSILON));
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_embedding_rejects_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [vec![0.1_f32; 32]] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    let error = run_blocking(move || client.generate_embedding("text"))
        .await
        .expect_err("dimension mismatch should fail");

    assert!(error.to_string().contains("32 dimensions, expected 64"));
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_embedding_fails_without_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    let result = run_blocking(move || client.generate_embedding("text")).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 64).with_retry_attempts(3);
    let result = run_blocking(move || client.generate_embedding("text")).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [vec![1.0_f32; 64]] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 64).with_retry_attempts(2);
    let embedding = run_blocking(move || client.generate_embedding("text"))
        .await
        .expect("second attempt should succeed");
    assert_eq!(embedding.len(), 64);
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_sends_system_and_user_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "chat-model",
            "stream": false,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": "What is a borrow?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "chat-model",
            "message": { "role": "assistant", "content": "A reference." },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    let answer = run_blocking(move || client.chat(SYSTEM_PROMPT, "What is a borrow?"))
        .await
        .expect("chat should succeed");

    assert_eq!(answer, "A reference.");
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "embed-model:latest" },
                { "name": "other-model:latest", "size": 1024 }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    let models = {
        let client = client.clone();
        run_blocking(move || client.list_models())
            .await
            .expect("listing models should succeed")
    };
    assert_eq!(models.len(), 2);
    assert_eq!(models[1].size, Some(1024));

    let error = run_blocking(move || client.health_check())
        .await
        .expect_err("missing chat model should fail the health check");
    assert!(format!("{:#}", error).contains("chat-model"));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_passes_with_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "embed-model:latest" },
                { "name": "chat-model:latest" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 64);
    run_blocking(move || client.health_check())
        .await
        .expect("health check should pass");
}
