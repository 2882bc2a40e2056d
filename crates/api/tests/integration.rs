//! Integration tests for the API layer.
//!
//! These tests spin up a real HTTP server on a random port backed by a
//! scripted classifier, and drive it with reqwest.

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use medirouter_api::{create_router, AppState};
use medirouter_common::{Result, RouterError};
use medirouter_coordinator::{
    CapabilityCatalog, Coordinator, HttpDispatchSink, LoggingDispatchSink,
};
use medirouter_llm::{FunctionCall, LlmClient, LlmRequest, LlmResponse};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns queued replies in order, optionally after a delay.
struct ScriptedClassifier {
    replies: Mutex<VecDeque<LlmResponse>>,
    delay: Duration,
}

impl ScriptedClassifier {
    fn new(replies: Vec<LlmResponse>) -> Arc<Self> {
        Self::delayed(replies, Duration::ZERO)
    }

    fn delayed(replies: Vec<LlmResponse>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClassifier {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RouterError::Transport("HTTP 503 from classifier".into()))
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

fn patient_call(query: &str) -> LlmResponse {
    LlmResponse::calls(
        "scripted-model",
        vec![FunctionCall {
            name: "manage_patient_info".into(),
            args: json!({ "query": query }),
        }],
    )
}

async fn start_server(coordinator: Coordinator) -> String {
    let state = Arc::new(AppState::from_coordinator(coordinator));
    let router = create_router(state, Some(vec!["*".to_string()]));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Spin up a test server whose classifier plays back `replies`.
async fn start_test_server(replies: Vec<LlmResponse>) -> String {
    start_server(Coordinator::with_components(
        CapabilityCatalog::medical(),
        ScriptedClassifier::new(replies),
        Arc::new(LoggingDispatchSink),
    ))
    .await
}

/// Helper to GET a URL and return (status, body).
async fn get(base: &str, path: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .get(format!("{}{}", base, path))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Helper to POST JSON and return (status, body).
async fn post_json(base: &str, path: &str, json: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .header("content-type", "application/json")
        .body(json.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Helper to DELETE a URL and return the status.
async fn delete(base: &str, path: &str) -> u16 {
    reqwest::Client::new()
        .delete(format!("{}{}", base, path))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

async fn open_conversation(base: &str) -> String {
    let (status, body) = post_json(base, "/api/v1/conversations", "{}").await;
    assert_eq!(status, 201);
    body["id"].as_str().unwrap().to_string()
}

// ============================================================================
// Health and catalog
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_test_server(vec![]).await;
    let (status, body) = get(&base, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "scripted-model");
    assert_eq!(body["catalog_version"], 1);
}

#[tokio::test]
async fn test_capabilities_endpoint() {
    let base = start_test_server(vec![]).await;
    let (status, body) = get(&base, "/api/v1/capabilities").await;
    assert_eq!(status, 200);
    let caps = body["capabilities"].as_array().unwrap();
    assert_eq!(caps.len(), 4);
    assert_eq!(caps[0]["name"], "manage_patient_info");
    assert_eq!(caps[0]["label"], "Patient Services");
    assert_eq!(caps[2]["arguments"].as_array().unwrap().len(), 2);
}

// ============================================================================
// Conversations
// ============================================================================

#[tokio::test]
async fn test_new_conversation_is_idle_and_empty() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    let (status, body) = get(&base, &format!("/api/v1/conversations/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["phase"], "idle");
    assert!(body["active_capability"].is_null());
    assert!(body["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_conversation_is_404() {
    let base = start_test_server(vec![]).await;
    let (status, body) = get(&base, "/api/v1/conversations/nope").await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = post_json(
        &base,
        "/api/v1/conversations/nope/messages",
        r#"{"content": "hello"}"#,
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_delete_conversation() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    assert_eq!(delete(&base, &format!("/api/v1/conversations/{id}")).await, 204);

    let (status, _) = get(&base, &format!("/api/v1/conversations/{id}")).await;
    assert_eq!(status, 404);
    assert_eq!(delete(&base, &format!("/api/v1/conversations/{id}")).await, 404);
}

#[tokio::test]
async fn test_conversation_limit_is_503_until_one_closes() {
    let base = start_server(
        Coordinator::with_components(
            CapabilityCatalog::medical(),
            ScriptedClassifier::new(vec![]),
            Arc::new(LoggingDispatchSink),
        )
        .with_max_conversations(2),
    )
    .await;

    let first = open_conversation(&base).await;
    open_conversation(&base).await;

    let (status, body) = post_json(&base, "/api/v1/conversations", "{}").await;
    assert_eq!(status, 503);
    assert_eq!(body["code"], "CONVERSATION_LIMIT");

    assert_eq!(delete(&base, &format!("/api/v1/conversations/{first}")).await, 204);
    open_conversation(&base).await;
}

#[tokio::test]
async fn test_message_dispatches_to_patient_services() {
    let base = start_test_server(vec![patient_call("Schedule a checkup for John Doe")]).await;
    let id = open_conversation(&base).await;

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "Schedule a checkup for John Doe"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "dispatched");
    assert_eq!(body["capability"], "manage_patient_info");

    let history = body["conversation"]["history"].as_array().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["author"], "user");
    assert_eq!(history[1]["is_transitional"], true);
    assert_eq!(
        history[2]["dispatch"]["arguments"]["query"],
        "Schedule a checkup for John Doe"
    );
    assert_eq!(body["conversation"]["phase"], "idle");
}

#[tokio::test]
async fn test_message_clarification() {
    let base = start_test_server(vec![LlmResponse::text(
        "scripted-model",
        "I cannot route this request.",
    )])
    .await;
    let id = open_conversation(&base).await;

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "what's the weather"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "clarified");
    assert_eq!(body["message"], "I cannot route this request.");
    assert_eq!(body["conversation"]["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_classifier_failure_is_a_turn_not_an_http_error() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "hello"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "failed");
    assert_eq!(body["failure"], "transport");

    let history = body["conversation"]["history"].as_array().unwrap();
    assert_eq!(history[1]["author"], "system");
    assert!(!history[1]["text"].as_str().unwrap().contains("503"));
}

// ============================================================================
// Input guards
// ============================================================================

#[tokio::test]
async fn test_empty_message_is_400() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "   "}"#,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_oversized_message_is_400() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    let content = "x".repeat(20_000);
    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        &format!(r#"{{"content": "{}"}}"#, content),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_payload_too_large() {
    let base = start_test_server(vec![]).await;
    let id = open_conversation(&base).await;

    let content = "x".repeat(200_000);
    let (status, _) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        &format!(r#"{{"content": "{}"}}"#, content),
    )
    .await;
    assert_eq!(status, 413, "Expected 413 Payload Too Large, got {}", status);
}

#[tokio::test]
async fn test_message_while_routing_is_409() {
    let base = start_server(Coordinator::with_components(
        CapabilityCatalog::medical(),
        ScriptedClassifier::delayed(
            vec![patient_call("first"), patient_call("second")],
            Duration::from_millis(400),
        ),
        Arc::new(LoggingDispatchSink),
    ))
    .await;
    let id = open_conversation(&base).await;

    let first = {
        let base = base.clone();
        let path = format!("/api/v1/conversations/{id}/messages");
        tokio::spawn(async move { post_json(&base, &path, r#"{"content": "first"}"#).await })
    };

    loop {
        let (_, body) = get(&base, &format!("/api/v1/conversations/{id}")).await;
        if body["phase"] == "routing" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "second"}"#,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], "CONVERSATION_BUSY");

    let (status, body) = first.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["conversation"]["history"].as_array().unwrap().len(), 3);
}

// ============================================================================
// HTTP dispatch sink against a live agent endpoint
// ============================================================================

#[tokio::test]
async fn test_http_sink_posts_to_agent_and_records_ack() {
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let agent = {
        let received = received.clone();
        Router::new().route(
            "/dispatch",
            post(move |Json(body): Json<Value>| {
                let received = received.clone();
                async move {
                    received.lock().unwrap().push(body);
                    Json(json!({"message": "Referral queued", "reference": "doc-42"}))
                }
            }),
        )
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, agent).await.unwrap();
    });

    let sink = HttpDispatchSink::new(
        HashMap::from([(
            "generate_document".to_string(),
            format!("http://{agent_addr}/dispatch"),
        )]),
        Duration::from_secs(5),
    )
    .unwrap();

    let classifier = ScriptedClassifier::new(vec![LlmResponse::calls(
        "scripted-model",
        vec![FunctionCall {
            name: "generate_document".into(),
            args: json!({"document_type": "referral", "content_details": "cardiology"}),
        }],
    )]);
    let base = start_server(Coordinator::with_components(
        CapabilityCatalog::medical(),
        classifier,
        Arc::new(sink),
    ))
    .await;
    let id = open_conversation(&base).await;

    let (status, body) = post_json(
        &base,
        &format!("/api/v1/conversations/{id}/messages"),
        r#"{"content": "Draft a cardiology referral"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "dispatched");
    assert_eq!(body["ack"]["reference"], "doc-42");

    let history = body["conversation"]["history"].as_array().unwrap();
    assert_eq!(history[2]["text"], "Referral queued");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["capability"], "generate_document");
    assert_eq!(received[0]["arguments"]["document_type"], "referral");
}
