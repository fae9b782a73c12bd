//! Event-driven chat session.
//!
//! [`ChatSession`] owns every client-side component and is the only thing
//! that mutates them. Backend calls run as spawned tokio tasks; each posts
//! its result back as an [`AppEvent`] on an unbounded channel, and the
//! owner feeds events to [`ChatSession::apply`] one at a time.
//!
//! ```text
//!   user action ──▶ ChatSession ──begin_*──▶ core state machine
//!                        │                        │ request
//!                        │                        ▼
//!                        │               tokio::spawn(backend call)
//!                        │                        │
//!                        ◀────── AppEvent ────────┘  (mpsc)
//!                     apply() ──settle──▶ core state machine
//! ```
//!
//! Guarantees carried over from the core crate:
//!
//! | Race | Guard |
//! |------|-------|
//! | Stats for an old namespace arrive late | [`RefreshTicket`] generation |
//! | Answer arrives after the conversation was replaced | [`ExchangeTicket`] |
//! | Status timer fires after a newer upload began | [`StatusTimer`] epoch |
//!
//! In-flight requests are never cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use ragchat_core::backend::{
    Backend, BackendError, ChatResponse, IngestReceipt, MetadataStats,
};
use ragchat_core::catalog::{CatalogEntry, CatalogUpdate, MetadataCatalog, RefreshTicket};
use ragchat_core::conversation::{
    ChatScope, ConversationStore, ExchangeTicket, SendRejected, Settlement,
};
use ragchat_core::filters::{FilterChange, FilterComposer, FilterRejected};
use ragchat_core::ingest::{
    IngestOutcome, IngestTicket, IngestionWorkflow, StatusTimer, SubmitRejected,
};
use ragchat_core::namespace::{NamespaceChange, NamespaceContext, NamespaceError};
use ragchat_core::session::SessionIdentity;

use crate::config::Config;

/// Result of a background task, delivered to the session's owner.
#[derive(Debug)]
pub enum AppEvent {
    CatalogLoaded {
        ticket: RefreshTicket,
        result: Result<MetadataStats, BackendError>,
    },
    ChatSettled {
        ticket: ExchangeTicket,
        result: Result<ChatResponse, BackendError>,
    },
    IngestSettled {
        ticket: IngestTicket,
        result: Result<IngestReceipt, BackendError>,
    },
    StatusExpired(StatusTimer),
}

/// What applying an event changed, for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    CatalogRefreshed { namespace: String, pruned: Vec<String> },
    CatalogFailed { namespace: String, error: BackendError },
    ChatAnswered { sources: usize },
    ChatFailed(BackendError),
    Ingested(IngestReceipt),
    IngestFailed(String),
    StatusCleared,
    /// The event was stale and changed nothing.
    Ignored,
}

/// Behaviour switches taken from configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub initial_namespace: String,
    pub reset_conversation_on_namespace_change: bool,
    pub status_display: Duration,
    pub default_source: String,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_namespace: config.session.default_namespace.clone(),
            reset_conversation_on_namespace_change: config
                .session
                .reset_conversation_on_namespace_change,
            status_display: config.ingest.status_display(),
            default_source: config.ingest.default_source.clone(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

pub struct ChatSession {
    backend: Arc<dyn Backend>,
    options: SessionOptions,
    namespace: NamespaceContext,
    catalog: MetadataCatalog,
    filters: FilterComposer,
    conversation: ConversationStore,
    ingest: IngestionWorkflow,
    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
}

impl ChatSession {
    /// Create a session and start loading the catalog for the initial
    /// namespace. Must be called from within a tokio runtime.
    pub fn new(backend: Arc<dyn Backend>, options: SessionOptions) -> Result<Self, NamespaceError> {
        let namespace = NamespaceContext::new(&options.initial_namespace)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Self {
            backend,
            namespace,
            catalog: MetadataCatalog::new(),
            filters: FilterComposer::new(),
            conversation: ConversationStore::new(SessionIdentity::new()),
            ingest: IngestionWorkflow::new(options.default_source.clone()),
            options,
            tx,
            rx,
        };
        session.refresh_catalog();
        Ok(session)
    }

    // ════════════════════════════════════════════════════════════════
    // Accessors
    // ════════════════════════════════════════════════════════════════

    pub fn namespace(&self) -> &str {
        self.namespace.current()
    }

    pub fn catalog_entry(&self) -> Option<&CatalogEntry> {
        self.catalog.entry(self.namespace.current())
    }

    pub fn filters(&self) -> &FilterComposer {
        &self.filters
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn ingest(&self) -> &IngestionWorkflow {
        &self.ingest
    }

    /// Mutable access for editing the ingestion draft and metadata rows.
    pub fn ingest_mut(&mut self) -> &mut IngestionWorkflow {
        &mut self.ingest
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ════════════════════════════════════════════════════════════════
    // Actions
    // ════════════════════════════════════════════════════════════════

    /// Switch namespace. On an actual change the filters are cleared, the
    /// catalog is refetched, and (if configured) a fresh conversation with
    /// a new session token replaces the current one.
    pub fn set_namespace(&mut self, name: &str) -> Result<NamespaceChange, NamespaceError> {
        let change = self.namespace.set(name)?;
        if let NamespaceChange::Switched { previous, current } = &change {
            tracing::info!(from = %previous, to = %current, "namespace changed");
            self.filters.reset();
            self.refresh_catalog();
            if self.options.reset_conversation_on_namespace_change {
                self.conversation = ConversationStore::new(SessionIdentity::new());
            }
        }
        Ok(change)
    }

    /// Refetch the catalog for the current namespace in the background.
    pub fn refresh_catalog(&mut self) {
        let ticket = self.catalog.begin_refresh(self.namespace.current());
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.metadata_stats(ticket.namespace()).await;
            let _ = tx.send(AppEvent::CatalogLoaded { ticket, result });
        });
    }

    /// Select a filter value, validated against the current catalog. The
    /// empty string clears the key.
    pub fn select_filter(&mut self, key: &str, value: &str) -> Result<FilterChange, FilterRejected> {
        let entry = self.catalog.entry(self.namespace.current());
        self.filters.select(entry, key, value)
    }

    pub fn clear_filters(&mut self) {
        self.filters.reset();
    }

    /// Append `query` and send it with the current namespace and filters.
    pub fn send_query(&mut self, query: &str) -> Result<(), SendRejected> {
        let filters = self.filters.to_query_payload();
        let scope = ChatScope {
            namespace: self.namespace.current(),
            filters: filters.as_ref(),
        };
        let (ticket, request) = self.conversation.begin_send(query, scope)?;

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.chat(&request).await;
            let _ = tx.send(AppEvent::ChatSettled { ticket, result });
        });
        Ok(())
    }

    /// Submit the ingestion draft to the current namespace.
    pub fn submit_ingest(&mut self) -> Result<(), SubmitRejected> {
        let (ticket, request) = match self.ingest.begin_submit(self.namespace.current()) {
            Ok(pair) => pair,
            Err(rejected) => {
                if let Some(timer) = self.ingest.status_timer() {
                    self.schedule_status_reset(timer);
                }
                return Err(rejected);
            }
        };
        tracing::info!(
            namespace = %request.namespace(),
            keys = request.metadata().len(),
            "submitting document"
        );

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.ingest(&request).await;
            let _ = tx.send(AppEvent::IngestSettled { ticket, result });
        });
        Ok(())
    }

    fn schedule_status_reset(&self, timer: StatusTimer) {
        let delay = self.options.status_display;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AppEvent::StatusExpired(timer));
        });
    }

    // ════════════════════════════════════════════════════════════════
    // Event handling
    // ════════════════════════════════════════════════════════════════

    /// Wait for the next background result.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Apply one background result.
    pub fn apply(&mut self, event: AppEvent) -> SessionUpdate {
        match event {
            AppEvent::CatalogLoaded { ticket, result } => {
                let namespace = ticket.namespace().to_string();
                match self.catalog.apply(ticket, result) {
                    CatalogUpdate::Applied => {
                        let pruned = match self.catalog.entry(self.namespace.current()) {
                            Some(entry) if namespace == self.namespace.current() => {
                                self.filters.retain_known(entry)
                            }
                            _ => Vec::new(),
                        };
                        SessionUpdate::CatalogRefreshed { namespace, pruned }
                    }
                    CatalogUpdate::Failed(error) => SessionUpdate::CatalogFailed { namespace, error },
                    CatalogUpdate::Stale => SessionUpdate::Ignored,
                }
            }
            AppEvent::ChatSettled { ticket, result } => match self.conversation.settle(&ticket, result) {
                Some(Settlement::Answered { sources }) => SessionUpdate::ChatAnswered { sources },
                Some(Settlement::Failed(e)) => SessionUpdate::ChatFailed(e),
                None => SessionUpdate::Ignored,
            },
            AppEvent::IngestSettled { ticket, result } => match self.ingest.settle(&ticket, result) {
                Some((outcome, timer)) => {
                    self.schedule_status_reset(timer);
                    match outcome {
                        IngestOutcome::Succeeded(receipt) => {
                            // New metadata may have appeared.
                            self.refresh_catalog();
                            SessionUpdate::Ingested(receipt)
                        }
                        IngestOutcome::Failed(message) => SessionUpdate::IngestFailed(message),
                    }
                }
                None => SessionUpdate::Ignored,
            },
            AppEvent::StatusExpired(timer) => {
                if self.ingest.expire(timer) {
                    SessionUpdate::StatusCleared
                } else {
                    SessionUpdate::Ignored
                }
            }
        }
    }

    /// Apply events until `done` holds, returning every update seen.
    pub async fn run_until<F>(&mut self, mut done: F) -> Vec<SessionUpdate>
    where
        F: FnMut(&Self) -> bool,
    {
        let mut updates = Vec::new();
        while !done(self) {
            match self.next_event().await {
                Some(event) => updates.push(self.apply(event)),
                None => break,
            }
        }
        updates
    }
}
