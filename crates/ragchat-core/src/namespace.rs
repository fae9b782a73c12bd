//! Active namespace.
//!
//! The namespace partitions both the document store and the metadata
//! catalog. Changing it invalidates namespace-scoped state (filters and
//! catalog); the caller reacts to the returned [`NamespaceChange`].
//! Conversation history is not touched here; a conversation may
//! span namespaces.

use thiserror::Error;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace must not be empty")]
    Empty,
}

/// Outcome of [`NamespaceContext::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceChange {
    /// Same value as before; nothing downstream should fire.
    Unchanged,
    /// The namespace moved; filters must reset and the catalog refetch.
    Switched { previous: String, current: String },
}

/// Holds the currently active namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    current: String,
}

impl NamespaceContext {
    pub fn new(initial: impl Into<String>) -> Result<Self, NamespaceError> {
        let current = initial.into();
        if current.trim().is_empty() {
            return Err(NamespaceError::Empty);
        }
        Ok(Self { current })
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Switch to `value`. Idempotent when `value` equals the current namespace.
    pub fn set(&mut self, value: &str) -> Result<NamespaceChange, NamespaceError> {
        if value.trim().is_empty() {
            return Err(NamespaceError::Empty);
        }
        if value == self.current {
            return Ok(NamespaceChange::Unchanged);
        }
        let previous = std::mem::replace(&mut self.current, value.to_string());
        Ok(NamespaceChange::Switched {
            previous,
            current: self.current.clone(),
        })
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self {
            current: DEFAULT_NAMESPACE.to_string(),
        }
    }
}
