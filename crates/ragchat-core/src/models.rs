//! Conversation data model.
//!
//! A conversation is an ordered list of [`Message`]s. Bot messages may
//! carry [`SourceRef`] citations returned by the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Source keys that are never shown as provenance badges.
const HIDDEN_SOURCE_KEYS: [&str; 2] = ["text", "namespace"];

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Citations for a bot answer. `None` for user messages and for
    /// fallback replies after a failed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: None,
        }
    }

    pub fn bot(text: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            sources: Some(sources),
        }
    }

    /// A bot reply with no citations at all.
    pub fn bot_without_sources(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            sources: None,
        }
    }

    /// Sources attached to this message, empty when there are none.
    pub fn sources(&self) -> &[SourceRef] {
        self.sources.as_deref().unwrap_or(&[])
    }
}

/// A backend-returned citation: an excerpt plus arbitrary provenance.
///
/// The backend copies the ingested document's metadata into each source,
/// so apart from the conventional `text` and `namespace` keys there is no
/// fixed schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub BTreeMap<String, Value>);

impl SourceRef {
    /// The content excerpt, if the source carries a string `text` field.
    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First `max_chars` characters of the excerpt followed by `...`.
    pub fn excerpt(&self, max_chars: usize) -> Option<String> {
        let text = self.text()?;
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        Some(out)
    }

    /// Provenance entries to display, excluding `text` and `namespace`.
    ///
    /// Scalar values are rendered without JSON quoting.
    pub fn badges(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter(|(k, _)| !HIDDEN_SOURCE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SourceRef {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SourceRef(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Render a JSON value for display: strings bare, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
