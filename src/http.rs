//! HTTP implementation of the [`Backend`] trait.
//!
//! Talks to the RAG service over its REST contract with a shared
//! `reqwest::Client`. Every call is bounded by `backend.timeout_secs`.
//!
//! Non-2xx responses become [`BackendError::Status`]. When the body is a
//! JSON object with a `detail` field it is carried along: a string detail
//! verbatim, a structured one (FastAPI validation errors) as compact JSON.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use ragchat_core::backend::{
    Backend, BackendError, ChatRequest, ChatResponse, HealthStatus, IngestFileRequest,
    IngestReceipt, IngestTextRequest, MetadataStats,
};

use crate::config::BackendConfig;

/// [`Backend`] backed by a live RAG service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        decode(response).await
    }
}

/// Pull a user-facing message out of an error body.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            detail: extract_detail(&body),
        });
    }

    // Ingestion only promises a 2xx; an empty body still counts.
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
}

fn file_part(request: &IngestFileRequest) -> Part {
    let part = Part::bytes(request.file.bytes.clone()).file_name(request.file.file_name.clone());
    match request.file.content_type.as_deref() {
        Some(ct) => match part.mime_str(ct) {
            Ok(part) => part,
            Err(e) => {
                tracing::debug!(content_type = ct, error = %e, "ignoring unparseable content type");
                Part::bytes(request.file.bytes.clone()).file_name(request.file.file_name.clone())
            }
        },
        None => part,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        tracing::debug!(namespace = %request.namespace, "POST /chat");
        self.execute(self.client.post(self.url("/chat")).json(request))
            .await
    }

    async fn ingest_text(&self, request: &IngestTextRequest) -> Result<IngestReceipt, BackendError> {
        tracing::debug!(namespace = %request.namespace, chars = request.text.chars().count(), "POST /ingest");
        self.execute(self.client.post(self.url("/ingest")).json(request))
            .await
    }

    async fn ingest_file(&self, request: &IngestFileRequest) -> Result<IngestReceipt, BackendError> {
        tracing::debug!(
            namespace = %request.namespace,
            file = %request.file.file_name,
            bytes = request.file.size(),
            "POST /ingest/file"
        );
        let form = Form::new()
            .part("file", file_part(request))
            .text("namespace", request.namespace.clone())
            .text("metadata", request.metadata_json());
        self.execute(self.client.post(self.url("/ingest/file")).multipart(form))
            .await
    }

    async fn metadata_stats(&self, namespace: &str) -> Result<MetadataStats, BackendError> {
        self.execute(
            self.client
                .get(self.url("/metadata/stats"))
                .query(&[("namespace", namespace)]),
        )
        .await
    }

    async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.execute(self.client.get(self.url("/health"))).await
    }
}
