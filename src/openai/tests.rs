use super::*;
use crate::conversation::PromptMessage;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        base_url: base_url.to_string(),
        embedding_dimension: 3,
        batch_size: 2,
        api_key: Some("sk-test".to_string()),
        ..OpenAiConfig::default()
    }
}

#[test]
fn client_configuration() {
    let client = OpenAiClient::new(&test_config("http://test-host:1234"))
        .expect("Failed to create client");

    assert_eq!(client.embedding_model, "text-embedding-ada-002");
    assert_eq!(client.batch_size, 2);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 1);
    assert_eq!(client.dimension(), 3);
}

#[test]
fn client_builder_methods() {
    let client = OpenAiClient::new(&test_config("http://localhost"))
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn missing_api_key_is_rejected() {
    let config = OpenAiConfig {
        api_key: None,
        ..test_config("http://localhost")
    };
    let err = OpenAiClient::new(&config).expect_err("no key means no client");
    assert!(err.to_string().contains(OPENAI_API_KEY_VAR));
}

#[tokio::test]
async fn embeddings_are_batched_and_ordered() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "input": ["a", "b"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                { "index": 0, "embedding": [1.0, 0.0, 0.0] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({ "input": ["c"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [0.0, 0.0, 1.0] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri())).expect("client should build");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = client.embed(&texts).expect("embedding should succeed");

    assert_eq!(
        vectors,
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0]
        ]
    );
}

#[tokio::test]
async fn wrong_dimension_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [1.0, 0.0] }]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri())).expect("client should build");
    let result = client.embed_one("short vector");
    assert!(result.is_err());
}

#[tokio::test]
async fn chat_completion_returns_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [
                { "role": "system", "content": "be helpful" },
                { "role": "user", "content": "hi" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri())).expect("client should build");
    let request = CompletionRequest::new(
        "gpt-4",
        vec![PromptMessage::system("be helpful"), PromptMessage::user("hi")],
        0.7,
    );

    assert_eq!(client.complete(&request).expect("completion should succeed"), "hello");
}

#[tokio::test]
async fn chat_server_error_is_not_retried_by_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri())).expect("client should build");
    let request = CompletionRequest::new("gpt-4", vec![PromptMessage::user("hi")], 0.7);

    assert!(client.complete(&request).is_err());
}

#[tokio::test]
async fn models_are_listed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "whisper-1" }, { "id": "gpt-4" }]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri())).expect("client should build");
    assert_eq!(
        client.list_models().expect("listing should succeed"),
        vec!["whisper-1".to_string(), "gpt-4".to_string()]
    );
}

fn retrying_client(server: &MockServer, attempts: u32) -> OpenAiClient {
    OpenAiClient::new(&OpenAiConfig {
        retry_attempts: attempts,
        ..test_config(&server.uri())
    })
    .expect("client should build")
}

#[tokio::test]
async fn completion_ignores_configured_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = retrying_client(&server, 3);
    let request = CompletionRequest::new("gpt-4", vec![PromptMessage::user("hi")], 0.7);

    assert!(client.complete(&request).is_err());
    let sent = server.received_requests().await.expect("recording is on");
    assert_eq!(sent.len(), 1);
}

#[tokio::test]
async fn query_embedding_ignores_configured_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = retrying_client(&server, 3);
    assert!(client.embed_one("login crash").is_err());
}

#[tokio::test]
async fn model_listing_ignores_configured_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let client = retrying_client(&server, 3);
    assert!(client.list_models().is_err());
}

#[tokio::test]
async fn bulk_embedding_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [1.0, 0.0, 0.0] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = retrying_client(&server, 2);
    let vectors = client
        .embed(&["login crash".to_string()])
        .expect("second attempt should succeed");

    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0]]);
}
