#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Integration tests against mocked hosted services
//!
//! The OpenAI-style and Pinecone-style HTTP clients are pointed at wiremock
//! servers, and the whole build, retrieve, complete cycle runs through them.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support_rag::app_description::{AppDescriptionGenerator, AppDescriptionRequest};
use support_rag::chat::{ChatEngine, ChatSettings};
use support_rag::completion::{ChatCompleter, ModelCatalog};
use support_rag::config::{AppDescriptionConfig, OpenAiConfig, VectorIndexConfig};
use support_rag::conversation::{PromptTemplate, SessionMemory};
use support_rag::embeddings::Embedder;
use support_rag::indexer::{EnsureOutcome, IndexManager, RebuildMode};
use support_rag::openai::OpenAiClient;
use support_rag::records::Record;
use support_rag::retrieval::Retriever;
use support_rag::vector_index::{PineconeClient, VectorIndexService};

const LOGIN_SENTENCE: &str = "The ticket Login fails that is a Bug, is assigned to Ana, it is currently Open and has the following description: App crashes on login";

fn tickets() -> Vec<Record> {
    vec![
        Record::new()
            .with("Summary", "Login fails")
            .with("Issue Type", "Bug")
            .with("Assignee", "Ana")
            .with("Status", "Open")
            .with("Description", "App crashes on login"),
        Record::new()
            .with("Summary", "Export report")
            .with("Issue Type", "Story")
            .with("Assignee", "Ben")
            .with("Status", "Done")
            .with("Description", "Monthly CSV export"),
    ]
}

fn openai_client(server: &MockServer) -> Arc<OpenAiClient> {
    let config = OpenAiConfig {
        base_url: server.uri(),
        embedding_dimension: 3,
        api_key: Some("sk-test".to_string()),
        ..OpenAiConfig::default()
    };
    Arc::new(OpenAiClient::new(&config).expect("OpenAI client should build"))
}

fn pinecone_client(server: &MockServer) -> Arc<PineconeClient> {
    let config = VectorIndexConfig {
        controller_url: server.uri(),
        api_key: Some("pc-test".to_string()),
        ..VectorIndexConfig::default()
    };
    Arc::new(
        PineconeClient::new(&config)
            .expect("index client should build")
            .with_ready_wait(Duration::from_secs(2), Duration::from_millis(10)),
    )
}

async fn mount_fresh_index(pinecone: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "indexes": [] })))
        .mount(pinecone)
        .await;

    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(body_partial_json(json!({ "name": "jira-demo", "dimension": 3, "metric": "cosine" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(pinecone)
        .await;

    Mock::given(method("GET"))
        .and(path("/indexes/jira-demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "jira-demo",
            "dimension": 3,
            "host": pinecone.uri(),
            "status": { "ready": true }
        })))
        .mount(pinecone)
        .await;

    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(header("Api-Key", "pc-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
        .expect(1)
        .mount(pinecone)
        .await;
}

async fn mount_embeddings(openai: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({ "input": ["login crash"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [1.0, 0.0, 0.0] }]
        })))
        .with_priority(1)
        .mount(openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                { "index": 0, "embedding": [1.0, 0.0, 0.0] }
            ]
        })))
        .mount(openai)
        .await;
}

#[tokio::test]
async fn build_then_chat_through_hosted_services() {
    let openai = MockServer::start().await;
    let pinecone = MockServer::start().await;
    mount_fresh_index(&pinecone).await;
    mount_embeddings(&openai).await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "vector": [1.0, 0.0, 0.0], "topK": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [{ "id": "ticket-1", "score": 0.99, "metadata": { "text": LOGIN_SENTENCE } }]
        })))
        .mount(&pinecone)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Reinstall the app." } }]
        })))
        .expect(1)
        .mount(&openai)
        .await;

    let openai_client = openai_client(&openai);
    let index: Arc<dyn VectorIndexService> = pinecone_client(&pinecone);

    let outcome = IndexManager::new(
        Arc::clone(&index),
        Arc::clone(&openai_client) as Arc<dyn Embedder>,
    )
    .ensure_index("jira-demo", &tickets(), RebuildMode::ReuseExisting)
    .expect("index should build");

    let EnsureOutcome::Built(handle, stats) = outcome else {
        panic!("expected a fresh build");
    };
    assert_eq!(stats.entries_inserted, 2);
    assert_eq!(handle.locator, pinecone.uri());

    let engine = ChatEngine {
        retriever: Retriever::new(
            Arc::clone(&index),
            Arc::clone(&openai_client) as Arc<dyn Embedder>,
        ),
        completer: Arc::clone(&openai_client) as Arc<dyn ChatCompleter>,
        handle,
        template: PromptTemplate::support_assistant("Hyer"),
        settings: ChatSettings::default(),
    };
    let mut session = engine.session(SessionMemory::unbounded());

    let reply = session.predict("login crash").expect("turn should succeed");
    assert_eq!(reply, "Reinstall the app.");

    let requests = openai
        .received_requests()
        .await
        .expect("request recording is on");
    let chat_request = requests
        .iter()
        .find(|r| r.url.path() == "/v1/chat/completions")
        .expect("a completion was requested");
    let body: Value = serde_json::from_slice(&chat_request.body).expect("json body");

    assert_eq!(body["model"], "gpt-4");
    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[4], json!({ "role": "system", "content": LOGIN_SENTENCE }));
    assert_eq!(messages[5], json!({ "role": "user", "content": "login crash" }));

    let upserts = pinecone
        .received_requests()
        .await
        .expect("request recording is on");
    let upsert = upserts
        .iter()
        .find(|r| r.url.path() == "/vectors/upsert")
        .expect("entries were upserted");
    let body: Value = serde_json::from_slice(&upsert.body).expect("json body");
    assert_eq!(body["vectors"][0]["id"], "ticket-1");
    assert_eq!(body["vectors"][0]["metadata"]["text"], LOGIN_SENTENCE);
    assert_eq!(body["vectors"][0]["values"], json!([1.0, 0.0, 0.0]));
}

#[tokio::test]
async fn existing_remote_index_is_attached() {
    let openai = MockServer::start().await;
    let pinecone = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indexes": [{ "name": "jira-demo", "dimension": 3, "host": "jira-demo.svc.io", "status": { "ready": true } }]
        })))
        .mount(&pinecone)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/jira-demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "jira-demo", "dimension": 3, "host": "jira-demo.svc.io", "status": { "ready": true }
        })))
        .mount(&pinecone)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&pinecone)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&openai)
        .await;

    let outcome = IndexManager::new(
        pinecone_client(&pinecone),
        openai_client(&openai),
    )
    .ensure_index("jira-demo", &tickets(), RebuildMode::ReuseExisting)
    .expect("attach should succeed");

    assert!(matches!(outcome, EnsureOutcome::Attached(_)));
    assert_eq!(outcome.handle().locator, "jira-demo.svc.io");
}

#[tokio::test]
async fn listing_uses_first_gpt_model() {
    let openai = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "whisper-1" }, { "id": "gpt-3.5-turbo" }, { "id": "gpt-4" }]
        })))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-3.5-turbo", "temperature": 0.7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "Plant smarter.\n\nFor the output format, JSON" } }]
        })))
        .expect(1)
        .mount(&openai)
        .await;

    let client = openai_client(&openai);
    let generator = AppDescriptionGenerator::new(
        Arc::clone(&client) as Arc<dyn ChatCompleter>,
        Arc::clone(&client) as Arc<dyn ModelCatalog>,
        "gpt-4",
        AppDescriptionConfig::default(),
    );

    let listing = generator
        .generate(&AppDescriptionRequest {
            category: "Lifestyle".to_string(),
            purpose_statement: "keep houseplants alive".to_string(),
            features: "watering reminders, light meter".to_string(),
            working_name: Some("Sprout".to_string()),
            ..AppDescriptionRequest::default()
        })
        .expect("listing should generate");

    assert_eq!(listing.choices[0].description, "Plant smarter.");
    assert_eq!(listing.choices[0].name.as_deref(), Some("Sprout"));
    assert_eq!(
        listing.keywords,
        vec!["watering reminders".to_string(), "light meter".to_string()]
    );
}
