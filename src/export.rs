//! Export the conversation transcript as JSON.
//!
//! Used by the REPL's `/save <path>`. The file holds the session token,
//! namespace, export time, and every message with its sources exactly as
//! received.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use ragchat_core::conversation::ConversationStore;
use ragchat_core::models::Message;

#[derive(Serialize)]
struct Transcript<'a> {
    session_id: &'a str,
    namespace: &'a str,
    exported_at: DateTime<Utc>,
    messages: &'a [Message],
}

/// Serialise the transcript to pretty JSON.
pub fn transcript_json(conversation: &ConversationStore, namespace: &str) -> Result<String> {
    let transcript = Transcript {
        session_id: conversation.session().token(),
        namespace,
        exported_at: Utc::now(),
        messages: conversation.messages(),
    };
    Ok(serde_json::to_string_pretty(&transcript)?)
}

/// Write the transcript to `output`.
pub fn save_transcript(conversation: &ConversationStore, namespace: &str, output: &Path) -> Result<()> {
    let json = transcript_json(conversation, namespace)?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write transcript: {}", output.display()))?;
    Ok(())
}
