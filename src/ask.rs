//! One-shot commands: `ragchat ask` and `ragchat ingest`.
//!
//! Both drive a [`ChatSession`] exactly as the REPL does and wait for the
//! single exchange or upload they started.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ragchat_core::backend::Backend;
use ragchat_core::ingest::IngestStatus;

use crate::attachment::load_attachment;
use crate::render::{self, OutputMode};
use crate::session::{ChatSession, SessionOptions, SessionUpdate};

/// Wait until the catalog fetch issued at startup has settled.
async fn await_catalog(session: &mut ChatSession) -> Result<()> {
    loop {
        let event = session
            .next_event()
            .await
            .context("session event channel closed")?;
        match session.apply(event) {
            SessionUpdate::CatalogRefreshed { .. } | SessionUpdate::CatalogFailed { .. } => {
                return Ok(())
            }
            _ => {}
        }
    }
}

/// Ask one question and print the answer with its sources.
pub async fn run_ask(
    backend: Arc<dyn Backend>,
    options: SessionOptions,
    query: &str,
    filters: &[(String, String)],
    mode: OutputMode,
) -> Result<()> {
    let mut session = ChatSession::new(backend, options)?;

    if !filters.is_empty() {
        await_catalog(&mut session).await?;
        for (key, value) in filters {
            session
                .select_filter(key, value)
                .with_context(|| format!("Invalid filter {}={}", key, value))?;
        }
    }

    session.send_query(query)?;
    mode.indicate("Thinking...");
    let updates = session.run_until(|s| !s.conversation().is_awaiting()).await;
    let failure = updates.into_iter().find_map(|u| match u {
        SessionUpdate::ChatFailed(e) => Some(e),
        _ => None,
    });

    let conversation = session.conversation();
    let answer = conversation
        .messages()
        .last()
        .context("no answer was recorded")?;

    if mode == OutputMode::Json {
        let body = serde_json::json!({
            "session_id": conversation.session().token(),
            "namespace": session.namespace(),
            "metadata_filters": session.filters().to_query_payload(),
            "answer": answer.text,
            "sources": answer.sources,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        render::render_message(&mut std::io::stdout().lock(), answer)?;
    }

    match failure {
        Some(e) => Err(anyhow::Error::new(e).context("Chat request failed")),
        None => Ok(()),
    }
}

/// Where `ragchat ingest` takes its document from.
pub enum IngestSource<'a> {
    Text(&'a str),
    File(&'a Path),
}

/// Upload one document with extra metadata rows.
pub async fn run_ingest(
    backend: Arc<dyn Backend>,
    options: SessionOptions,
    source: IngestSource<'_>,
    meta: &[(String, String)],
    mode: OutputMode,
) -> Result<()> {
    let mut session = ChatSession::new(backend, options)?;

    let draft = session.ingest_mut();
    match source {
        IngestSource::Text(text) => draft.set_text(text),
        IngestSource::File(path) => {
            draft.attach_file(load_attachment(path)?);
            if let Some(file) = draft.file() {
                println!("File: {}", file.file_name);
            }
        }
    }
    for (key, value) in meta {
        draft.fields_mut().append(key.as_str(), value.as_str());
    }

    session.submit_ingest()?;
    mode.indicate("Uploading...");
    let updates = session.run_until(|s| !s.ingest().is_uploading()).await;

    for update in updates {
        match update {
            SessionUpdate::Ingested(receipt) => {
                render::render_ingest_status(&mut std::io::stdout().lock(), &IngestStatus::Success)?;
                if let Some(message) = receipt.message {
                    println!("{}", message);
                }
                return Ok(());
            }
            SessionUpdate::IngestFailed(message) => anyhow::bail!("{}", message),
            _ => {}
        }
    }
    anyhow::bail!("ingestion did not complete")
}
