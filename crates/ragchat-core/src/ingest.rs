//! Document ingestion workflow.
//!
//! The draft holds pasted text and, optionally, one attached file. When a
//! file is attached it is the payload; the text field only previews it
//! (the file's contents for text-like files, a `name (size)` placeholder
//! otherwise) and is never submitted.
//!
//! # State machine
//!
//! ```text
//!   Idle ──begin_submit──▶ Uploading ──settle(Ok)──▶ Success ──expire──▶ Idle
//!     │                        └──────settle(Err)──▶ Error   ──expire──▶ Idle
//!     └──begin_submit (empty draft)───────────────▶ Error
//! ```
//!
//! `Success` and `Error` are display states. The caller schedules
//! [`IngestionWorkflow::expire`] with the [`StatusTimer`] it got when the
//! state was entered; every status change bumps an epoch so an old timer
//! can never reset a newer state.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::backend::{
    Backend, BackendError, FileAttachment, IngestFileRequest, IngestReceipt, IngestRequest,
    IngestTextRequest, MetadataMap,
};

/// Value of the `source` row in a fresh metadata list.
pub const DEFAULT_SOURCE: &str = "user-upload";

/// Shown when submitting with neither text nor a file.
pub const EMPTY_PAYLOAD_MESSAGE: &str = "Please provide document text or select a file.";

/// Shown when a failure carries no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to upload";

/// Extensions previewed as text regardless of the reported MIME type.
const TEXT_EXTENSIONS: [&str; 4] = ["txt", "md", "json", "csv"];

// ═══════════════════════════════════════════════════════════════════════
// Metadata rows
// ═══════════════════════════════════════════════════════════════════════

/// One editable metadata row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataField {
    pub key: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no metadata row at index {index} (have {len})")]
pub struct FieldIndexError {
    pub index: usize,
    pub len: usize,
}

/// Ordered metadata rows, identified by index.
///
/// Duplicate keys are allowed while editing. [`to_mapping`](Self::to_mapping)
/// drops rows with a blank key and lets the last duplicate win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFieldList {
    fields: Vec<MetadataField>,
    default_source: String,
}

impl MetadataFieldList {
    /// A list holding the single row `source=<default_source>`.
    pub fn new(default_source: impl Into<String>) -> Self {
        let default_source = default_source.into();
        Self {
            fields: vec![MetadataField::new("source", default_source.clone())],
            default_source,
        }
    }

    pub fn fields(&self) -> &[MetadataField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append a row and return its index.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> usize {
        self.fields.push(MetadataField::new(key, value));
        self.fields.len() - 1
    }

    /// Append a blank row and return its index.
    pub fn append_empty(&mut self) -> usize {
        self.append("", "")
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut MetadataField, FieldIndexError> {
        let len = self.fields.len();
        self.fields
            .get_mut(index)
            .ok_or(FieldIndexError { index, len })
    }

    pub fn set_key(&mut self, index: usize, key: impl Into<String>) -> Result<(), FieldIndexError> {
        self.row_mut(index)?.key = key.into();
        Ok(())
    }

    pub fn set_value(&mut self, index: usize, value: impl Into<String>) -> Result<(), FieldIndexError> {
        self.row_mut(index)?.value = value.into();
        Ok(())
    }

    /// Remove the row at `index`; later rows shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<MetadataField, FieldIndexError> {
        if index >= self.fields.len() {
            return Err(FieldIndexError {
                index,
                len: self.fields.len(),
            });
        }
        Ok(self.fields.remove(index))
    }

    /// Back to the single default row.
    pub fn reset(&mut self) {
        self.fields = vec![MetadataField::new("source", self.default_source.clone())];
    }

    /// Flatten into a mapping: blank keys dropped, keys trimmed, last
    /// duplicate wins.
    pub fn to_mapping(&self) -> MetadataMap {
        let mut map = BTreeMap::new();
        for field in &self.fields {
            let key = field.key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), field.value.clone());
        }
        map
    }
}

impl Default for MetadataFieldList {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// File preview
// ═══════════════════════════════════════════════════════════════════════

/// Whether `file` should be previewed as text: a textual MIME type or a
/// known text extension, and contents that decode as UTF-8.
pub fn is_text_like(file: &FileAttachment) -> bool {
    let mime_ok = file
        .content_type
        .as_deref()
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.starts_with("application/json")
        })
        .unwrap_or(false);
    let ext_ok = Path::new(&file.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    (mime_ok || ext_ok) && std::str::from_utf8(&file.bytes).is_ok()
}

/// Placeholder shown for files that cannot be previewed: `name (size)`.
pub fn file_placeholder(file: &FileAttachment) -> String {
    format!("{} ({})", file.file_name, format_bytes(file.size()))
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Workflow
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    Idle,
    Uploading,
    Success,
    Error(String),
}

/// Which payload a submission would carry right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Empty,
    Text,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("an ingestion is already in progress")]
    InFlight,
    #[error("{}", EMPTY_PAYLOAD_MESSAGE)]
    EmptyPayload,
}

/// Identifies one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTicket {
    seq: u64,
}

/// Handle for the auto-reset of a `Success`/`Error` display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTimer {
    epoch: u64,
}

/// How a submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Succeeded(IngestReceipt),
    Failed(String),
}

#[derive(Debug)]
pub struct IngestionWorkflow {
    text: String,
    file: Option<FileAttachment>,
    fields: MetadataFieldList,
    status: IngestStatus,
    epoch: u64,
    pending: Option<IngestTicket>,
    next_seq: u64,
}

impl IngestionWorkflow {
    pub fn new(default_source: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            file: None,
            fields: MetadataFieldList::new(default_source),
            status: IngestStatus::Idle,
            epoch: 0,
            pending: None,
            next_seq: 0,
        }
    }

    /// Text field contents: pasted text, or the preview of an attached file.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn file(&self) -> Option<&FileAttachment> {
        self.file.as_ref()
    }

    pub fn fields(&self) -> &MetadataFieldList {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut MetadataFieldList {
        &mut self.fields
    }

    pub fn status(&self) -> &IngestStatus {
        &self.status
    }

    pub fn is_uploading(&self) -> bool {
        self.status == IngestStatus::Uploading
    }

    pub fn mode(&self) -> DraftMode {
        if self.file.is_some() {
            DraftMode::File
        } else if self.text.trim().is_empty() {
            DraftMode::Empty
        } else {
            DraftMode::Text
        }
    }

    /// Replace the text field.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Attach `file` as the payload and preview it into the text field.
    pub fn attach_file(&mut self, file: FileAttachment) {
        self.text = if is_text_like(&file) {
            String::from_utf8_lossy(&file.bytes).into_owned()
        } else {
            file_placeholder(&file)
        };
        self.file = Some(file);
    }

    /// Drop the attached file and its preview.
    pub fn detach_file(&mut self) -> Option<FileAttachment> {
        let file = self.file.take();
        if file.is_some() {
            self.text.clear();
        }
        file
    }

    fn set_status(&mut self, status: IngestStatus) -> StatusTimer {
        self.status = status;
        self.epoch += 1;
        StatusTimer { epoch: self.epoch }
    }

    /// The timer for the current display state, if it has one.
    pub fn status_timer(&self) -> Option<StatusTimer> {
        match self.status {
            IngestStatus::Success | IngestStatus::Error(_) => Some(StatusTimer { epoch: self.epoch }),
            _ => None,
        }
    }

    /// Return to `Idle` if `timer` still belongs to the current
    /// `Success`/`Error` state. Returns whether anything changed.
    pub fn expire(&mut self, timer: StatusTimer) -> bool {
        if timer.epoch != self.epoch || self.status_timer().is_none() {
            return false;
        }
        self.set_status(IngestStatus::Idle);
        true
    }

    /// Validate the draft and build the request for `namespace`.
    ///
    /// While uploading this is a no-op. With an empty draft the workflow
    /// enters `Error` and no request is produced.
    pub fn begin_submit(
        &mut self,
        namespace: &str,
    ) -> Result<(IngestTicket, IngestRequest), SubmitRejected> {
        if self.is_uploading() {
            return Err(SubmitRejected::InFlight);
        }

        let metadata = self.fields.to_mapping();
        let request = match (&self.file, self.text.trim().is_empty()) {
            (Some(file), _) => IngestRequest::File(IngestFileRequest {
                file: file.clone(),
                namespace: namespace.to_string(),
                metadata,
            }),
            (None, false) => IngestRequest::Text(IngestTextRequest {
                text: self.text.clone(),
                metadata,
                namespace: namespace.to_string(),
            }),
            (None, true) => {
                self.set_status(IngestStatus::Error(EMPTY_PAYLOAD_MESSAGE.to_string()));
                return Err(SubmitRejected::EmptyPayload);
            }
        };

        let ticket = IngestTicket { seq: self.next_seq };
        self.next_seq += 1;
        self.pending = Some(ticket.clone());
        self.set_status(IngestStatus::Uploading);
        Ok((ticket, request))
    }

    /// Apply the backend's answer for `ticket`.
    ///
    /// On success the draft and metadata rows reset; on failure they are
    /// kept so the user can retry. Returns `None` for an unknown ticket.
    pub fn settle(
        &mut self,
        ticket: &IngestTicket,
        result: Result<IngestReceipt, BackendError>,
    ) -> Option<(IngestOutcome, StatusTimer)> {
        if self.pending.as_ref() != Some(ticket) {
            tracing::debug!(seq = ticket.seq, "ignoring result for an unknown ingestion");
            return None;
        }
        self.pending = None;

        match result {
            Ok(receipt) => {
                self.text.clear();
                self.file = None;
                self.fields.reset();
                let timer = self.set_status(IngestStatus::Success);
                Some((IngestOutcome::Succeeded(receipt), timer))
            }
            Err(e) => {
                tracing::warn!(error = %e, "ingestion failed");
                let message = e.user_message(GENERIC_FAILURE_MESSAGE);
                let timer = self.set_status(IngestStatus::Error(message.clone()));
                Some((IngestOutcome::Failed(message), timer))
            }
        }
    }

    /// Submit against `backend` and wait for the answer.
    pub async fn submit<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        namespace: &str,
    ) -> Result<(IngestOutcome, StatusTimer), SubmitRejected> {
        let (ticket, request) = self.begin_submit(namespace)?;
        let result = backend.ingest(&request).await;
        self.settle(&ticket, result)
            .ok_or(SubmitRejected::InFlight)
    }
}

impl Default for IngestionWorkflow {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}
