//! REST contract of the RAG backend.
//!
//! The [`Backend`] trait mirrors the endpoints the client consumes so the
//! state machines can be driven against a real HTTP service or the
//! [`memory::InMemoryBackend`] used in tests.
//!
//! | Method | Endpoint |
//! |--------|----------|
//! | [`chat`](Backend::chat) | `POST /chat` |
//! | [`ingest_text`](Backend::ingest_text) | `POST /ingest` |
//! | [`ingest_file`](Backend::ingest_file) | `POST /ingest/file` (multipart) |
//! | [`metadata_stats`](Backend::metadata_stats) | `GET /metadata/stats?namespace=` |
//! | [`health`](Backend::health) | `GET /health` |
//!
//! Implementations must be `Send + Sync` so calls can run on spawned tasks.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::SourceRef;

/// Flattened document metadata sent with an ingestion.
pub type MetadataMap = BTreeMap<String, String>;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub session_id: String,
    pub namespace: String,
    /// `None` serialises as JSON `null`, meaning "no filtering".
    pub metadata_filters: Option<BTreeMap<String, String>>,
}

/// Response of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    /// Absent or `null` sources are treated as an empty list.
    #[serde(default)]
    pub sources: Option<Vec<SourceRef>>,
}

impl ChatResponse {
    pub fn into_parts(self) -> (String, Vec<SourceRef>) {
        (self.answer, self.sources.unwrap_or_default())
    }
}

/// Body of `POST /ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestTextRequest {
    pub text: String,
    pub metadata: MetadataMap,
    pub namespace: String,
}

/// A file selected for ingestion, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Multipart body of `POST /ingest/file`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestFileRequest {
    pub file: FileAttachment,
    pub namespace: String,
    pub metadata: MetadataMap,
}

impl IngestFileRequest {
    /// The `metadata` form field: the mapping encoded as one JSON string.
    pub fn metadata_json(&self) -> String {
        serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One ingestion submission, in whichever mode the draft was in.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestRequest {
    Text(IngestTextRequest),
    File(IngestFileRequest),
}

impl IngestRequest {
    pub fn namespace(&self) -> &str {
        match self {
            IngestRequest::Text(r) => &r.namespace,
            IngestRequest::File(r) => &r.namespace,
        }
    }

    pub fn metadata(&self) -> &MetadataMap {
        match self {
            IngestRequest::Text(r) => &r.metadata,
            IngestRequest::File(r) => &r.metadata,
        }
    }
}

/// Acknowledgement body of a successful ingestion. Both fields are optional
/// because the contract only promises a 2xx status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /metadata/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataStats {
    #[serde(default)]
    pub metadata_keys: BTreeMap<String, Vec<Value>>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Failure of a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Non-2xx response; `detail` is the backend's `{"detail": ...}` if any.
    #[error("backend returned HTTP {status}{}", .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
    Status { status: u16, detail: Option<String> },

    /// Connection, timeout, or other transport failure.
    #[error("{0}")]
    Transport(String),

    /// 2xx response whose body did not match the contract.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// Backend-supplied detail message, if the response carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            BackendError::Status { detail, .. } => detail.as_deref().filter(|d| !d.is_empty()),
            _ => None,
        }
    }

    /// Message to show the user: backend detail first, then the transport
    /// message, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }
        let msg = match self {
            BackendError::Status { status, .. } => {
                format!("Request failed with status code {}", status)
            }
            BackendError::Transport(msg) | BackendError::Decode(msg) => msg.clone(),
        };
        if msg.trim().is_empty() {
            fallback.to_string()
        } else {
            msg
        }
    }
}

/// Abstract client for the RAG backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Ask a question within a namespace, optionally narrowed by filters.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;

    /// Ingest pasted text with its metadata.
    async fn ingest_text(&self, request: &IngestTextRequest) -> Result<IngestReceipt, BackendError>;

    /// Ingest one file plus sidecar metadata.
    async fn ingest_file(&self, request: &IngestFileRequest) -> Result<IngestReceipt, BackendError>;

    /// Known metadata keys and observed values for a namespace.
    async fn metadata_stats(&self, namespace: &str) -> Result<MetadataStats, BackendError>;

    /// Liveness probe.
    async fn health(&self) -> Result<HealthStatus, BackendError>;

    /// Dispatch an [`IngestRequest`] to the matching endpoint.
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestReceipt, BackendError> {
        match request {
            IngestRequest::Text(r) => self.ingest_text(r).await,
            IngestRequest::File(r) => self.ingest_file(r).await,
        }
    }
}
