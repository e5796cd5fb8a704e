//! Route tests driven through the router with `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use sentinel_core::channels::sign_payload;
use sentinel_core::config::ConversationConfig;
use sentinel_core::memory::SqliteMemoryStore;
use sentinel_core::reasoning::{ReasoningBackend, ReasoningGateway};
use sentinel_core::traits::{Embedder, GenerationOptions, Llm, LlmResponse};
use sentinel_core::types::Message;
use sentinel_core::{ConversationEngine, SentinelResult};
use sentinel_server::{create_server, AppState};

fn state() -> AppState {
    let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let gateway = Arc::new(ReasoningGateway::new(Vec::new()));
    let engine = Arc::new(ConversationEngine::new(&ConversationConfig::default(), store, gateway).unwrap());
    AppState::new(engine, Arc::new(Notify::new()))
}

/// Replies with a fixed line.
struct Canned(&'static str);

#[async_trait]
impl Llm for Canned {
    async fn generate(&self, _: &[Message], _: Option<GenerationOptions>) -> SentinelResult<LlmResponse> {
        Ok(LlmResponse::text(self.0))
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

/// Puts texts about ladders on one axis and everything else on the other.
struct LadderEmbedder;

#[async_trait]
impl Embedder for LadderEmbedder {
    async fn embed(&self, text: &str) -> SentinelResult<Vec<f32>> {
        Ok(if text.contains("ladder") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "ladder"
    }
}

fn chat_state(reply: &'static str) -> AppState {
    let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
    let backend = ReasoningBackend::new("canned", Arc::new(Canned(reply)), Duration::from_secs(5));
    let gateway = Arc::new(ReasoningGateway::new(vec![backend]));
    let engine = ConversationEngine::new(&ConversationConfig::default(), store, gateway)
        .unwrap()
        .with_embedder(Arc::new(LadderEmbedder));
    AppState::new(Arc::new(engine), Arc::new(Notify::new()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn test_health_degraded_without_backends() {
    let app = create_server(state());
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(body.get("active_session").is_none());
}

#[tokio::test]
async fn test_wake_notifies_heartbeat() {
    let state = state();
    let wake = state.wake.clone();
    let app = create_server(state);

    let (status, _) = send(&app, "POST", "/wake", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_flow_over_http() {
    let app = create_server(state());

    let (status, started) = send(&app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["step"]["type"], "ask");
    assert_eq!(started["step"]["text"], "What task are you performing?");
    let id = started["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, active) = send(&app, "GET", "/sessions/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["session_id"], id.as_str());

    let answers = format!("/sessions/{}/answers", id);
    let (status, step) = send(&app, "POST", &answers, Some(json!({"text": "vacuuming", "question_index": 0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(step["type"], "ask");

    // Redelivery of the same answer.
    let (status, body) = send(&app, "POST", &answers, Some(json!({"text": "vacuuming", "question_index": 0}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["code"].is_string());

    let (status, step) = send(&app, "POST", &answers, Some(json!({"text": "yes", "question_index": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(step["type"], "complete");
    assert_eq!(step["summary"], "Completed safety check with 2 answers.");

    let (status, _) = send(&app, "GET", "/sessions/active", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, turns) = send(&app, "GET", &format!("/sessions/{}/turns", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turns.as_array().unwrap().len(), 4);

    let (status, recent) = send(&app, "GET", "/memory/recent?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recent.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_answer_without_question_index_is_rejected() {
    let state = state();
    let engine = state.engine.clone();
    let app = create_server(state);
    let id = engine.start_session().await.unwrap().session_id;

    let answers = format!("/sessions/{}/answers", id);
    let (status, _) = send(&app, "POST", &answers, Some(json!({"text": "vacuuming"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let session = engine.session(&id).await.unwrap().unwrap();
    assert!(session.answers.is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = create_server(state());
    let (status, _) = send(&app, "GET", "/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({"text": "hi", "question_index": 0});
    let (status, _) = send(&app, "POST", "/sessions/nope/answers", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_without_embedder_is_unavailable() {
    let app = create_server(state());
    let (status, _) = send(&app, "POST", "/memory/search", Some(json!({"query": "ladder"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_inbound_webhook_requires_signature() {
    let state = state().with_webhook_secret(Some("s3cret".to_string()));
    let engine = state.engine.clone();
    let app = create_server(state);
    let id = engine.start_session().await.unwrap().session_id;

    let payload = json!({"session_id": id, "question_index": 0, "text": "cleaning gutters"}).to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/channels/webhook/answers")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.clone().oneshot(unsigned).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let signed = Request::builder()
        .method("POST")
        .uri("/channels/webhook/answers")
        .header("X-Sentinel-Signature", sign_payload(&payload, "s3cret"))
        .body(Body::from(payload))
        .unwrap();
    assert_eq!(app.clone().oneshot(signed).await.unwrap().status(), StatusCode::OK);

    let session = engine.session(&id).await.unwrap().unwrap();
    assert_eq!(session.answer_for("task_identification"), Some("cleaning gutters"));
}

#[tokio::test]
async fn test_inbound_webhook_disabled_without_secret() {
    let app = create_server(state());
    let (status, _) = send(
        &app,
        "POST",
        "/channels/webhook/answers",
        Some(json!({"session_id": "x", "question_index": 0, "text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_continues_and_ends() {
    let app = create_server(chat_state("Keep three points of contact."));

    let (status, first) = send(&app, "POST", "/chat", Some(json!({"text": "Any ladder tips?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["reply"], "Keep three points of contact.");
    assert_eq!(first["backend"], "canned");
    let chat_id = first["chat_id"].as_str().unwrap().to_string();

    let (status, second) = send(&app, "POST", "/chat", Some(json!({"text": "Thanks", "chat_id": chat_id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["chat_id"], chat_id.as_str());

    let (status, hits) = send(&app, "POST", "/memory/search", Some(json!({"query": "ladder", "k": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits["results"][0]["text"], "Any ladder tips?");
    assert_eq!(hits["results"][0]["session_id"], chat_id.as_str());

    let (status, _) = send(&app, "DELETE", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_without_backends_is_unavailable() {
    let app = create_server(state());
    let (status, body) = send(&app, "POST", "/chat", Some(json!({"text": "hello"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]["details"]["attempts"].is_array());

    let (status, _) = send(&app, "POST", "/chat", Some(json!({"text": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
