//! End-to-end tests over a real listener: spawn the server on an ephemeral
//! port with a mock engine, drive it with reqwest.

use std::sync::Arc;

use config::EnvTag;
use tokio::net::TcpListener;

use serve::{run_serve_on_listener, AppState};
use switchboard::{
    AgentFactory, ConversationState, FactoryConfig, MemoryThreadStore, MockEngine, PromptStore,
    Router, StoreError, ThreadStore,
};

async fn spawn_with_store(
    reply: &str,
    store: Arc<dyn ThreadStore>,
) -> (String, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new(reply));
    let factory = AgentFactory::new(PromptStore::new(), FactoryConfig::default());
    let router = Router::new(factory, engine.clone());
    let state = Arc::new(AppState {
        router: Arc::new(router),
        store,
        env: EnvTag::Local,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = run_serve_on_listener(listener, state).await;
    });
    (format!("http://{addr}"), engine)
}

async fn spawn_server(reply: &str) -> (String, Arc<MockEngine>, Arc<MemoryThreadStore>) {
    let store = Arc::new(MemoryThreadStore::new());
    let (base, engine) = spawn_with_store(reply, store.clone()).await;
    (base, engine, store)
}

/// Store whose backend is down: every call fails.
struct FailingStore;

#[async_trait::async_trait]
impl ThreadStore for FailingStore {
    async fn load(&self, _thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Err(StoreError::Storage("backend down".to_string()))
    }

    async fn save(&self, _state: &ConversationState) -> Result<(), StoreError> {
        Err(StoreError::Storage("backend down".to_string()))
    }
}

#[tokio::test]
async fn health_reports_ok_and_env() {
    let (base, _, _) = spawn_server("ok").await;
    let body: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "local");
}

#[tokio::test]
async fn nodes_lists_the_registry() {
    let (base, _, _) = spawn_server("ok").await;
    let body: serde_json::Value = reqwest::get(format!("{base}/nodes"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["nodes"], serde_json::json!(["assistant"]));
}

#[tokio::test]
async fn invoke_mints_a_thread_and_replies() {
    let (base, engine, store) = spawn_server("canned reply").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/invoke"))
        .json(&serde_json::json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(body["node"], "assistant");
    assert_eq!(body["response"], "canned reply");
    let thread_id = body["thread_id"].as_str().unwrap();
    assert!(!thread_id.is_empty());
    assert_eq!(engine.call_count(), 1);

    let saved = store.load(thread_id).await.unwrap().unwrap();
    assert_eq!(saved.messages.len(), 2);
    assert_eq!(saved.active_node, "assistant");
}

#[tokio::test]
async fn invoke_unknown_node_is_rejected_before_the_engine() {
    let (base, engine, _) = spawn_server("ok").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/invoke"))
        .json(&serde_json::json!({ "message": "hi", "node": "researcher" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unknown node"));
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn same_thread_accumulates_history_in_order() {
    let (base, _, store) = spawn_server("reply").await;
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .post(format!("{base}/invoke"))
        .json(&serde_json::json!({ "message": "one" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = first["thread_id"].as_str().unwrap().to_string();

    let second: serde_json::Value = client
        .post(format!("{base}/invoke"))
        .json(&serde_json::json!({ "message": "two", "thread_id": thread_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["thread_id"].as_str().unwrap(), thread_id);

    let saved = store.load(&thread_id).await.unwrap().unwrap();
    let contents: Vec<&str> = saved.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "reply", "two", "reply"]);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn stream_sends_chunks_then_done() {
    let (base, _, store) = spawn_server("streamed reply").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/stream"))
        .json(&serde_json::json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let thread_id = resp
        .headers()
        .get("x-thread-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(
        resp.headers().get("x-node").and_then(|v| v.to_str().ok()),
        Some("assistant")
    );

    let body = resp.text().await.unwrap();
    assert!(body.contains("data: streamed reply"));
    assert!(body.contains("data: [DONE]"));

    let saved = store.load(&thread_id).await.unwrap().unwrap();
    assert_eq!(saved.last_assistant_reply(), Some("streamed reply"));
}

#[tokio::test]
async fn store_failure_is_service_unavailable() {
    let (base, engine) = spawn_with_store("ok", Arc::new(FailingStore)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/invoke"))
        .json(&serde_json::json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("state unavailable"));
    assert_eq!(engine.call_count(), 0);
}

/// Browser clients hit the API cross-origin; preflight and simple requests
/// must carry the permissive CORS headers.
#[tokio::test]
async fn cors_allows_any_origin() {
    let (base, _, _) = spawn_server("ok").await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/health"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn stream_unknown_node_is_a_plain_http_error() {
    let (base, engine, _) = spawn_server("ok").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/stream"))
        .json(&serde_json::json!({ "message": "hi", "node": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(engine.call_count(), 0);
}
