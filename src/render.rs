//! Terminal rendering.
//!
//! Everything the user reads goes to stdout through the functions here, so
//! it stays separate from `tracing` output on stderr. Writers are generic
//! over [`Write`] so the layout can be checked in tests.
//!
//! Transient indicators ("Thinking...", "Uploading...") go to stderr and
//! only when stderr is a terminal; see [`OutputMode::default_for_tty`].

use std::io::{self, Write};

use ragchat_core::catalog::CatalogEntry;
use ragchat_core::filters::FilterComposer;
use ragchat_core::ingest::{DraftMode, IngestStatus, IngestionWorkflow, MetadataFieldList};
use ragchat_core::models::{Message, Role, SourceRef};

use crate::session::SessionUpdate;

/// Shown in place of an empty conversation.
pub const EMPTY_STATE_HINT: &str = "Start a conversation with your documents.";

/// Shown when the namespace has no catalog to filter on.
pub const NO_METADATA: &str = "No metadata available for filtering.";

/// Characters of source text shown before truncation.
pub const EXCERPT_CHARS: usize = 100;

/// How command results are printed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputMode {
    /// Human-readable text, no indicators.
    Plain,
    /// Human-readable text with transient indicators on stderr.
    Interactive,
    /// One JSON document on stdout.
    Json,
}

impl OutputMode {
    /// Interactive when stderr is a TTY, otherwise plain.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            OutputMode::Interactive
        } else {
            OutputMode::Plain
        }
    }

    /// Print a transient indicator line, if this mode shows them.
    pub fn indicate(&self, text: &str) {
        if *self == OutputMode::Interactive {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{}", text);
            let _ = err.flush();
        }
    }
}

pub fn document_loaded(chars: usize) -> String {
    format!("Document loaded ({} chars)", chars)
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Bot => "bot",
    }
}

pub fn render_sources<W: Write>(out: &mut W, sources: &[SourceRef]) -> io::Result<()> {
    if sources.is_empty() {
        return Ok(());
    }
    writeln!(out, "  Sources:")?;
    for (i, source) in sources.iter().enumerate() {
        let badges = source
            .badges()
            .into_iter()
            .map(|(k, v)| format!("[{}: {}]", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        if badges.is_empty() {
            writeln!(out, "  {}.", i + 1)?;
        } else {
            writeln!(out, "  {}. {}", i + 1, badges)?;
        }
        if let Some(excerpt) = source.excerpt(EXCERPT_CHARS) {
            writeln!(out, "     {}", excerpt)?;
        }
    }
    Ok(())
}

pub fn render_message<W: Write>(out: &mut W, message: &Message) -> io::Result<()> {
    writeln!(out, "{}> {}", role_label(message.role), message.text)?;
    render_sources(out, message.sources())
}

pub fn render_history<W: Write>(out: &mut W, messages: &[Message]) -> io::Result<()> {
    if messages.is_empty() {
        return writeln!(out, "{}", EMPTY_STATE_HINT);
    }
    for message in messages {
        render_message(out, message)?;
    }
    Ok(())
}

/// Filter choices for the current namespace plus the active count.
pub fn render_filters<W: Write>(
    out: &mut W,
    entry: Option<&CatalogEntry>,
    filters: &FilterComposer,
) -> io::Result<()> {
    match entry.filter(|e| !e.is_empty()) {
        None => writeln!(out, "{}", NO_METADATA)?,
        Some(entry) => {
            for choice in filters.choices(entry) {
                let selected = choice.selected.as_deref().unwrap_or("All");
                writeln!(
                    out,
                    "  {} = {}  (choices: All, {})",
                    choice.key,
                    selected,
                    choice.values.join(", ")
                )?;
            }
        }
    }
    if !filters.is_empty() {
        writeln!(out, "{} filter(s) active", filters.len())?;
    }
    Ok(())
}

pub fn render_metadata_rows<W: Write>(out: &mut W, rows: &MetadataFieldList) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "  (no metadata rows)");
    }
    for (i, row) in rows.fields().iter().enumerate() {
        writeln!(out, "  {}: {} = {}", i, row.key, row.value)?;
    }
    Ok(())
}

pub fn render_draft<W: Write>(out: &mut W, ingest: &IngestionWorkflow) -> io::Result<()> {
    match (ingest.mode(), ingest.file()) {
        (DraftMode::File, Some(file)) => {
            writeln!(out, "File: {}", file.file_name)?;
            writeln!(out, "{}", document_loaded(ingest.text().chars().count()))?;
        }
        (DraftMode::Text, _) => {
            writeln!(out, "Text: {} chars", ingest.text().chars().count())?;
        }
        _ => writeln!(out, "No document text or file selected.")?,
    }
    writeln!(out, "Metadata:")?;
    render_metadata_rows(out, ingest.fields())
}

pub fn render_ingest_status<W: Write>(out: &mut W, status: &IngestStatus) -> io::Result<()> {
    match status {
        IngestStatus::Idle => Ok(()),
        IngestStatus::Uploading => writeln!(out, "Uploading..."),
        IngestStatus::Success => writeln!(out, "Document ingested successfully."),
        IngestStatus::Error(message) => writeln!(out, "Error: {}", message),
    }
}

/// Print the effect of a background update. `last` is the newest message,
/// used for answers.
pub fn render_update<W: Write>(
    out: &mut W,
    update: &SessionUpdate,
    last: Option<&Message>,
) -> io::Result<()> {
    match update {
        SessionUpdate::ChatAnswered { .. } | SessionUpdate::ChatFailed(_) => match last {
            Some(message) => render_message(out, message),
            None => Ok(()),
        },
        SessionUpdate::Ingested(_) => render_ingest_status(out, &IngestStatus::Success),
        SessionUpdate::IngestFailed(message) => {
            render_ingest_status(out, &IngestStatus::Error(message.clone()))
        }
        SessionUpdate::CatalogRefreshed { pruned, .. } if !pruned.is_empty() => writeln!(
            out,
            "Cleared filters no longer in the catalog: {}",
            pruned.join(", ")
        ),
        _ => Ok(()),
    }
}
