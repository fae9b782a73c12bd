//! In-memory [`Backend`] implementation for tests and offline runs.
//!
//! Ingested documents are kept as payload maps (metadata plus `text` and
//! `namespace`), the same shape the real service returns as sources.
//! Chat ranks documents in the requested namespace by query-term overlap
//! and answers with a canned sentence. Every call is recorded, and a
//! failure can be queued per endpoint.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Backend, BackendError, ChatRequest, ChatResponse, HealthStatus, IngestFileRequest,
    IngestReceipt, IngestTextRequest, MetadataStats,
};
use crate::models::{display_value, SourceRef};

/// Maximum sources returned per answer.
const MAX_SOURCES: usize = 3;

/// Backend endpoints, used to target queued failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Chat,
    IngestText,
    IngestFile,
    MetadataStats,
    Health,
}

/// A call observed by the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Chat(ChatRequest),
    IngestText(IngestTextRequest),
    IngestFile(IngestFileRequest),
    MetadataStats(String),
    Health,
}

#[derive(Default)]
struct State {
    documents: Vec<BTreeMap<String, Value>>,
    calls: Vec<RecordedCall>,
    failures: HashMap<Endpoint, Vec<BackendError>>,
}

/// In-memory backend.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call to `endpoint` fail with `error`. Queued failures
    /// are consumed in FIFO order.
    pub fn fail_next(&self, endpoint: Endpoint, error: BackendError) {
        self.state()
            .failures
            .entry(endpoint)
            .or_default()
            .push(error);
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of stored documents across all namespaces.
    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    fn begin(&self, endpoint: Endpoint, call: RecordedCall) -> Result<MutexGuard<'_, State>, BackendError> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(queue) = state.failures.get_mut(&endpoint) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(state)
    }
}

fn store_document(state: &mut State, text: &str, metadata: &BTreeMap<String, String>, namespace: &str) {
    let mut payload: BTreeMap<String, Value> = metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    payload.insert("text".to_string(), Value::String(text.to_string()));
    payload.insert("namespace".to_string(), Value::String(namespace.to_string()));
    state.documents.push(payload);
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn matches_filters(doc: &BTreeMap<String, Value>, filters: Option<&BTreeMap<String, String>>) -> bool {
    filters.map_or(true, |filters| {
        filters
            .iter()
            .all(|(k, v)| doc.get(k).map(display_value).as_deref() == Some(v.as_str()))
    })
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let state = self.begin(Endpoint::Chat, RecordedCall::Chat(request.clone()))?;
        let query_terms = terms(&request.query);

        let mut ranked: Vec<(usize, &BTreeMap<String, Value>)> = state
            .documents
            .iter()
            .filter(|doc| doc.get("namespace").and_then(Value::as_str) == Some(request.namespace.as_str()))
            .filter(|doc| matches_filters(doc, request.metadata_filters.as_ref()))
            .map(|doc| {
                let text = doc.get("text").and_then(Value::as_str).unwrap_or_default();
                (terms(text).intersection(&query_terms).count(), doc)
            })
            .collect();
        // Stable sort keeps ingestion order among equal scores.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let sources: Vec<SourceRef> = ranked
            .into_iter()
            .take(MAX_SOURCES)
            .map(|(_, doc)| SourceRef(doc.clone()))
            .collect();

        let answer = if sources.is_empty() {
            format!(
                "I could not find anything relevant in namespace '{}'.",
                request.namespace
            )
        } else {
            format!(
                "Based on {} source{}: {}",
                sources.len(),
                if sources.len() == 1 { "" } else { "s" },
                sources[0].excerpt(80).unwrap_or_default()
            )
        };

        Ok(ChatResponse {
            answer,
            sources: Some(sources),
        })
    }

    async fn ingest_text(&self, request: &IngestTextRequest) -> Result<IngestReceipt, BackendError> {
        let mut state = self.begin(Endpoint::IngestText, RecordedCall::IngestText(request.clone()))?;
        store_document(&mut state, &request.text, &request.metadata, &request.namespace);
        Ok(IngestReceipt {
            status: Some("success".to_string()),
            message: Some("Document ingested".to_string()),
        })
    }

    async fn ingest_file(&self, request: &IngestFileRequest) -> Result<IngestReceipt, BackendError> {
        let mut state = self.begin(Endpoint::IngestFile, RecordedCall::IngestFile(request.clone()))?;
        let text = String::from_utf8_lossy(&request.file.bytes).into_owned();
        store_document(&mut state, &text, &request.metadata, &request.namespace);
        Ok(IngestReceipt {
            status: Some("success".to_string()),
            message: Some(format!("File '{}' ingested", request.file.file_name)),
        })
    }

    async fn metadata_stats(&self, namespace: &str) -> Result<MetadataStats, BackendError> {
        let state = self.begin(
            Endpoint::MetadataStats,
            RecordedCall::MetadataStats(namespace.to_string()),
        )?;

        let mut keys: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for doc in state
            .documents
            .iter()
            .filter(|doc| doc.get("namespace").and_then(Value::as_str) == Some(namespace))
        {
            for (k, v) in doc {
                if k == "text" || k == "namespace" {
                    continue;
                }
                let values = keys.entry(k.clone()).or_default();
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        Ok(MetadataStats { metadata_keys: keys })
    }

    async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.begin(Endpoint::Health, RecordedCall::Health)?;
        Ok(HealthStatus {
            status: "ok".to_string(),
            version: None,
        })
    }
}
