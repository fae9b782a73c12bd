//! Mock RAG backend for integration tests.
//!
//! An axum server on an ephemeral port that records every request and
//! answers with fixed payloads. A few magic inputs trigger errors:
//!
//! | Input | Response |
//! |-------|----------|
//! | chat query `boom` | 500 `{"detail": "LLM unavailable"}` |
//! | ingest text `reject` | 422 with a structured FastAPI detail |
//! | stats namespace `broken` | 500 with a plain-text body |

#![allow(dead_code)]

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One multipart field as received.
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub chats: Vec<Value>,
    pub ingests: Vec<Value>,
    pub file_uploads: Vec<Vec<FormField>>,
    pub stats_queries: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockState {
    recorded: Arc<Mutex<Recorded>>,
}

impl MockState {
    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().unwrap().clone()
    }
}

async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.recorded.lock().unwrap().chats.push(body.clone());
    let query = body["query"].as_str().unwrap_or_default().to_string();
    if query == "boom" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "LLM unavailable"})),
        )
            .into_response();
    }
    Json(json!({
        "answer": format!("You asked: {}", query),
        "sources": [
            {"text": "X is a variable used in examples.", "namespace": body["namespace"], "author": "Alice", "page": 3},
            {"text": "Second source.", "namespace": body["namespace"]}
        ]
    }))
    .into_response()
}

async fn ingest(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.recorded.lock().unwrap().ingests.push(body.clone());
    if body["text"] == "reject" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": [{"loc": ["body", "metadata"], "msg": "bad"}]})),
        )
            .into_response();
    }
    Json(json!({"status": "success", "message": "Document ingested"})).into_response()
}

async fn ingest_file(State(state): State<MockState>, mut multipart: Multipart) -> Response {
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        fields.push(FormField {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    state.recorded.lock().unwrap().file_uploads.push(fields);
    // The real service may answer with an empty 200.
    StatusCode::OK.into_response()
}

async fn stats(State(state): State<MockState>, Query(q): Query<HashMap<String, String>>) -> Response {
    let namespace = q.get("namespace").cloned().unwrap_or_default();
    state.recorded.lock().unwrap().stats_queries.push(namespace.clone());
    if namespace == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    Json(json!({
        "metadata_keys": {
            "author": ["Alice", "Bob"],
            "year": [2023, 2024]
        }
    }))
    .into_response()
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": "test"}))
}

/// Start the mock and return its base URL and recorder.
pub async fn spawn_mock() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/chat", post(chat))
        .route("/ingest", post(ingest))
        .route("/ingest/file", post(ingest_file))
        .route("/metadata/stats", get(stats))
        .route("/health", get(health))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}
