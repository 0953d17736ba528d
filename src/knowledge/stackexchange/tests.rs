use super::*;
use crate::config::StackExchangeConfig;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

fn client_for(server: &MockServer, api_key: Option<&str>) -> StackExchangeClient {
    let config = Config {
        stackexchange: StackExchangeConfig {
            api_url: format!("{}/2.3", server.uri()),
            site: "stackoverflow".to_string(),
            api_key: api_key.map(str::to_string),
            max_candidates: 3,
            ..StackExchangeConfig::default()
        },
        ..Config::default()
    };
    StackExchangeClient::new(&config).expect("should create client")
}

#[tokio::test]
async fn search_maps_question_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/search/advanced"))
        .and(query_param("q", "reverse a list"))
        .and(query_param("site", "stackoverflow"))
        .and(query_param("sort", "relevance"))
        .and(query_param("filter", "withbody"))
        .and(query_param("pagesize", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "question_id": 42, "title": "T", "body": "B", "score": 7 },
                { "question_id": 43, "title": "U", "body": "C" }
            ],
            "has_more": false,
            "quota_remaining": 299
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let questions = client
        .search_questions("reverse a list")
        .await
        .expect("search should succeed");

    assert_eq!(
        questions,
        vec![
            QuestionCandidate {
                id: 42,
                title: "T".to_string(),
                body: "B".to_string(),
            },
            QuestionCandidate {
                id: 43,
                title: "U".to_string(),
                body: "C".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn search_sends_api_key_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/search/advanced"))
        .and(query_param("key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("secret"));
    let questions = client
        .search_questions("anything")
        .await
        .expect("search should succeed");
    assert!(questions.is_empty());
}

#[tokio::test]
async fn fetch_answers_maps_answer_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/questions/42/answers"))
        .and(query_param("sort", "votes"))
        .and(query_param("filter", "withbody"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "answer_id": 100, "body": "A1", "is_accepted": true, "score": 10 },
                { "answer_id": 101, "body": "A2", "score": -1 }
            ],
            "backoff": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let answers = client
        .fetch_answers(42)
        .await
        .expect("fetch should succeed");

    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].id, 100);
    assert!(answers[0].accepted);
    assert_eq!(answers[0].score, 10);
    assert_eq!(answers[1].body, "A2");
    assert!(!answers[1].accepted);
    assert_eq!(answers[1].score, -1);
}

#[tokio::test]
async fn non_success_status_is_a_remote_fetch_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/questions/42/answers"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let error = client
        .fetch_answers(42)
        .await
        .expect_err("server error should fail");

    assert!(matches!(error, StackRagError::RemoteFetch(_)));
    assert!(error.to_string().contains("HTTP 502"));
}

#[tokio::test]
async fn api_error_envelope_is_a_remote_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/search/advanced"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_id": 502,
            "error_name": "throttle_violation",
            "error_message": "too many requests from this IP"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let error = client
        .search_questions("anything")
        .await
        .expect_err("API error should fail");

    assert!(matches!(error, StackRagError::RemoteFetch(_)));
    assert!(error.to_string().contains("too many requests"));
}

#[tokio::test]
async fn undecodable_body_is_a_remote_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/search/advanced"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let result = client.search_questions("anything").await;
    assert!(matches!(result, Err(StackRagError::RemoteFetch(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_queries_site_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.3/info"))
        .and(query_param("site", "stackoverflow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "total_questions": 24000000 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should join")
        .expect("health check should pass");
}

#[test]
fn redact_key_hides_api_key() {
    let url = Url::parse("https://api.example.com/2.3/info?site=so&key=secret")
        .expect("url should parse");
    let redacted = redact_key(&url);

    assert!(!redacted.contains("secret"));
    assert!(redacted.contains("site=so"));
}
