//! Append-only conversation log with a single in-flight exchange.
//!
//! # State machine
//!
//! ```text
//!          begin_send                 settle(Ok)  ─▶ bot answer
//!   Idle ─────────────▶ AwaitingResponse ─────────────────────────▶ Idle
//!                                      └──────────────────────────▶ Idle
//!                                         settle(Err) ─▶ fallback reply
//! ```
//!
//! [`ConversationStore::begin_send`] appends the user message before any
//! network activity and hands back the [`ChatRequest`] to send. Exactly
//! one bot message is appended when the exchange settles. Messages are
//! never edited or removed.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::backend::{Backend, BackendError, ChatRequest, ChatResponse};
use crate::models::{Message, Role, SourceRef};
use crate::session::SessionIdentity;

/// Reply appended when a chat request fails.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error.";

/// Why a send was refused. The store is untouched in both cases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("query is empty")]
    BlankQuery,
    #[error("still waiting for the previous answer")]
    AwaitingResponse,
}

/// Identifies one exchange so a late answer cannot settle a different one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeTicket {
    session_id: String,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingResponse(ExchangeTicket),
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Answered { sources: usize },
    Failed(BackendError),
}

/// Namespace-scoped inputs for a chat request.
#[derive(Debug, Clone, Copy)]
pub struct ChatScope<'a> {
    pub namespace: &'a str,
    pub filters: Option<&'a BTreeMap<String, String>>,
}

/// Message log of one conversation instance.
#[derive(Debug)]
pub struct ConversationStore {
    session: SessionIdentity,
    messages: Vec<Message>,
    state: ExchangeState,
    next_seq: u64,
}

impl ConversationStore {
    pub fn new(session: SessionIdentity) -> Self {
        Self {
            session,
            messages: Vec::new(),
            state: ExchangeState::Idle,
            next_seq: 0,
        }
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ExchangeState::AwaitingResponse(_))
    }

    /// Whether `query` would be accepted right now.
    pub fn can_send(&self, query: &str) -> bool {
        !self.is_awaiting() && !query.trim().is_empty()
    }

    /// Validate `query`, append it as a user message, and enter
    /// `AwaitingResponse`. Returns the request to send and its ticket.
    pub fn begin_send(
        &mut self,
        query: &str,
        scope: ChatScope<'_>,
    ) -> Result<(ExchangeTicket, ChatRequest), SendRejected> {
        if query.trim().is_empty() {
            return Err(SendRejected::BlankQuery);
        }
        if self.is_awaiting() {
            return Err(SendRejected::AwaitingResponse);
        }

        self.messages.push(Message::user(query));
        let ticket = ExchangeTicket {
            session_id: self.session.token().to_string(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.state = ExchangeState::AwaitingResponse(ticket.clone());

        let request = ChatRequest {
            query: query.to_string(),
            session_id: self.session.token().to_string(),
            namespace: scope.namespace.to_string(),
            metadata_filters: scope.filters.cloned(),
        };
        Ok((ticket, request))
    }

    /// Record the outcome of the exchange identified by `ticket`.
    ///
    /// Returns `None` (and changes nothing) when `ticket` is not the
    /// pending exchange of this store.
    pub fn settle(
        &mut self,
        ticket: &ExchangeTicket,
        result: Result<ChatResponse, BackendError>,
    ) -> Option<Settlement> {
        match &self.state {
            ExchangeState::AwaitingResponse(pending) if pending == ticket => {}
            _ => {
                tracing::debug!(seq = ticket.seq, "ignoring answer for an unknown exchange");
                return None;
            }
        }
        Some(self.finish(result))
    }

    fn finish(&mut self, result: Result<ChatResponse, BackendError>) -> Settlement {
        self.state = ExchangeState::Idle;
        match result {
            Ok(response) => {
                let (answer, sources) = response.into_parts();
                let count = sources.len();
                self.messages.push(Message::bot(answer, sources));
                Settlement::Answered { sources: count }
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                self.messages.push(Message::bot_without_sources(FALLBACK_REPLY));
                Settlement::Failed(e)
            }
        }
    }

    /// Run one full exchange against `backend`.
    pub async fn send<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        query: &str,
        scope: ChatScope<'_>,
    ) -> Result<Settlement, SendRejected> {
        let (_ticket, request) = self.begin_send(query, scope)?;
        let result = backend.chat(&request).await;
        Ok(self.finish(result))
    }

    /// Sources of the most recent bot message, if any.
    pub fn last_sources(&self) -> &[SourceRef] {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Bot)
            .map(Message::sources)
            .unwrap_or(&[])
    }
}
