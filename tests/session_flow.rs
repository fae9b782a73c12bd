//! End-to-end session flows: `ChatSession` driving `HttpBackend` against
//! the mock service, plus race handling with a slow backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragchat::config::BackendConfig;
use ragchat::http::HttpBackend;
use ragchat::session::{ChatSession, SessionOptions, SessionUpdate};
use ragchat_core::backend::{
    Backend, BackendError, ChatRequest, ChatResponse, FileAttachment, HealthStatus,
    IngestFileRequest, IngestReceipt, IngestTextRequest, MetadataStats,
};
use ragchat_core::ingest::IngestStatus;
use ragchat_core::models::Role;
use serde_json::{json, Value};

fn options() -> SessionOptions {
    SessionOptions {
        status_display: Duration::from_millis(20),
        ..SessionOptions::default()
    }
}

async fn http_session() -> (ChatSession, common::MockState) {
    let (url, mock) = common::spawn_mock().await;
    let backend = HttpBackend::new(&BackendConfig {
        base_url: url,
        timeout_secs: 5,
    })
    .unwrap();
    let mut session = ChatSession::new(Arc::new(backend), options()).unwrap();
    session.run_until(|s| s.catalog_entry().is_some()).await;
    (session, mock)
}

#[tokio::test]
async fn test_first_question_yields_user_then_bot() {
    let (mut session, mock) = http_session().await;
    session.send_query("What is X?").unwrap();
    session.run_until(|s| !s.conversation().is_awaiting()).await;

    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text, "What is X?");
    assert_eq!(messages[1].role, Role::Bot);
    assert_eq!(messages[1].sources().len(), 2);

    let sent = &mock.recorded().chats[0];
    assert_eq!(sent["session_id"], session.conversation().session().token());
    assert_eq!(sent["namespace"], "default");
}

#[tokio::test]
async fn test_cleared_filter_sends_null() {
    let (mut session, mock) = http_session().await;
    session.select_filter("author", "Alice").unwrap();
    session.select_filter("author", "").unwrap();
    session.send_query("q").unwrap();
    session.run_until(|s| !s.conversation().is_awaiting()).await;
    assert_eq!(mock.recorded().chats[0]["metadata_filters"], Value::Null);
}

#[tokio::test]
async fn test_numeric_catalog_values_selectable() {
    let (mut session, mock) = http_session().await;
    session.select_filter("year", "2024").unwrap();
    session.send_query("q").unwrap();
    session.run_until(|s| !s.conversation().is_awaiting()).await;
    assert_eq!(
        mock.recorded().chats[0]["metadata_filters"],
        json!({"year": "2024"})
    );
}

#[tokio::test]
async fn test_failed_chat_appends_fallback() {
    let (mut session, _mock) = http_session().await;
    session.send_query("boom").unwrap();
    let updates = session.run_until(|s| !s.conversation().is_awaiting()).await;
    assert!(matches!(updates.last(), Some(SessionUpdate::ChatFailed(_))));
    let last = session.conversation().messages().last().unwrap();
    assert_eq!(last.text, "Sorry, I encountered an error.");
    assert_eq!(last.sources, None);

    // Retrying is a new query.
    session.send_query("again").unwrap();
    session.run_until(|s| !s.conversation().is_awaiting()).await;
    assert_eq!(session.conversation().len(), 4);
}

#[tokio::test]
async fn test_text_ingestion_body() {
    let (mut session, mock) = http_session().await;
    session.ingest_mut().set_text("hello");
    session.submit_ingest().unwrap();
    session
        .run_until(|s| s.ingest().status() == &IngestStatus::Success)
        .await;

    assert_eq!(
        mock.recorded().ingests[0],
        json!({"text": "hello", "metadata": {"source": "user-upload"}, "namespace": "default"})
    );
    assert_eq!(session.ingest().text(), "");
}

#[tokio::test]
async fn test_file_ingestion_never_sends_preview() {
    let (mut session, mock) = http_session().await;
    session.ingest_mut().attach_file(FileAttachment::new(
        "report.pdf",
        Some("application/pdf".into()),
        vec![0x25, 0x50, 0x44, 0x46, 0xff],
    ));
    assert_eq!(session.ingest().text(), "report.pdf (5 B)");
    session.submit_ingest().unwrap();
    session.run_until(|s| !s.ingest().is_uploading()).await;

    let recorded = mock.recorded();
    assert!(recorded.ingests.is_empty());
    let fields = &recorded.file_uploads[0];
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["file", "namespace", "metadata"]);
    assert!(fields.iter().all(|f| f.bytes != b"report.pdf (5 B)"));
    assert_eq!(fields[2].bytes, br#"{"source":"user-upload"}"#);
}

#[tokio::test]
async fn test_ingestion_failure_keeps_draft() {
    let (mut session, _mock) = http_session().await;
    session.ingest_mut().set_text("reject");
    session.ingest_mut().fields_mut().append("author", "Alice");
    session.submit_ingest().unwrap();
    let updates = session.run_until(|s| !s.ingest().is_uploading()).await;

    let message = updates.iter().find_map(|u| match u {
        SessionUpdate::IngestFailed(m) => Some(m.clone()),
        _ => None,
    });
    assert_eq!(
        message.as_deref(),
        Some(r#"[{"loc":["body","metadata"],"msg":"bad"}]"#)
    );
    assert_eq!(session.ingest().text(), "reject");
    assert_eq!(session.ingest().fields().len(), 2);

    session
        .run_until(|s| s.ingest().status() == &IngestStatus::Idle)
        .await;
}

#[tokio::test]
async fn test_namespace_switch_refetches_stats() {
    let (mut session, mock) = http_session().await;
    session.set_namespace("legal").unwrap();
    session.run_until(|s| s.catalog_entry().is_some()).await;
    assert_eq!(
        mock.recorded().stats_queries,
        vec!["default".to_string(), "legal".to_string()]
    );
}

// ─── Slow backend ───────────────────────────────────────────────────

/// Answers stats for namespace `slow` only after a delay, so a later
/// switch can overtake it.
struct SlowStatsBackend;

#[async_trait]
impl Backend for SlowStatsBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        Ok(ChatResponse {
            answer: request.query.clone(),
            sources: None,
        })
    }

    async fn ingest_text(&self, _request: &IngestTextRequest) -> Result<IngestReceipt, BackendError> {
        Ok(IngestReceipt::default())
    }

    async fn ingest_file(&self, _request: &IngestFileRequest) -> Result<IngestReceipt, BackendError> {
        Ok(IngestReceipt::default())
    }

    async fn metadata_stats(&self, namespace: &str) -> Result<MetadataStats, BackendError> {
        if namespace == "slow" {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(MetadataStats {
            metadata_keys: [(
                "origin".to_string(),
                vec![Value::String(namespace.to_string())],
            )]
            .into_iter()
            .collect(),
        })
    }

    async fn health(&self) -> Result<HealthStatus, BackendError> {
        Ok(HealthStatus {
            status: "ok".into(),
            version: None,
        })
    }
}

#[tokio::test]
async fn test_late_stats_for_previous_namespace_discarded() {
    let mut session = ChatSession::new(
        Arc::new(SlowStatsBackend),
        SessionOptions {
            initial_namespace: "slow".into(),
            ..options()
        },
    )
    .unwrap();
    session.set_namespace("fast").unwrap();

    // Fast answer, then the slow one for the abandoned namespace.
    let first = session.next_event().await.unwrap();
    assert!(matches!(
        session.apply(first),
        SessionUpdate::CatalogRefreshed { .. }
    ));
    let second = session.next_event().await.unwrap();
    assert_eq!(session.apply(second), SessionUpdate::Ignored);

    let entry = session.catalog_entry().unwrap();
    assert_eq!(entry.namespace, "fast");
    assert!(entry.contains("origin", "fast"));
}
