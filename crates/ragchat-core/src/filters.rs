//! Active metadata filters for the next chat query.
//!
//! A key is present only while it has a non-empty value. Selecting the
//! "All" entry (the empty string) removes the key. The backend tells
//! "no filtering" (`null`) apart from an empty object, so
//! [`FilterComposer::to_query_payload`] returns `None` when nothing is
//! selected.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::catalog::CatalogEntry;

/// Value that stands for "All" in a filter choice.
pub const ALL_SENTINEL: &str = "";

/// A selection that cannot be honoured against the current catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterRejected {
    #[error("no metadata available for filtering in this namespace")]
    CatalogUnavailable,
    #[error("unknown metadata key: {0}")]
    UnknownKey(String),
    #[error("value '{value}' was never observed for key '{key}'")]
    UnknownValue { key: String, value: String },
}

/// What a call to [`FilterComposer::set_filter`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Set,
    Removed,
    Unchanged,
}

/// One selectable filter: a catalog key, its values, and the current pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChoice {
    pub key: String,
    pub values: Vec<String>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterComposer {
    active: BTreeMap<String, String>,
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> &BTreeMap<String, String> {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Set `key` to `value`, or remove it when `value` is the "All" sentinel.
    pub fn set_filter(&mut self, key: &str, value: &str) -> FilterChange {
        if value.trim() == ALL_SENTINEL {
            return match self.active.remove(key) {
                Some(_) => FilterChange::Removed,
                None => FilterChange::Unchanged,
            };
        }
        match self.active.insert(key.to_string(), value.to_string()) {
            Some(prev) if prev == value => FilterChange::Unchanged,
            _ => FilterChange::Set,
        }
    }

    /// Like [`set_filter`](Self::set_filter), but only accepts keys and
    /// values present in `catalog`.
    pub fn select(
        &mut self,
        catalog: Option<&CatalogEntry>,
        key: &str,
        value: &str,
    ) -> Result<FilterChange, FilterRejected> {
        if value.trim() == ALL_SENTINEL {
            return Ok(self.set_filter(key, value));
        }
        let catalog = catalog
            .filter(|c| !c.is_empty())
            .ok_or(FilterRejected::CatalogUnavailable)?;
        if catalog.values(key).is_none() {
            return Err(FilterRejected::UnknownKey(key.to_string()));
        }
        if !catalog.contains(key, value) {
            return Err(FilterRejected::UnknownValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(self.set_filter(key, value))
    }

    /// Drop every selection.
    pub fn reset(&mut self) {
        self.active.clear();
    }

    /// Drop selections whose key or value no longer appears in `catalog`.
    /// Returns the removed keys.
    pub fn retain_known(&mut self, catalog: &CatalogEntry) -> Vec<String> {
        let mut removed = Vec::new();
        self.active.retain(|k, v| {
            let keep = catalog.contains(k, v);
            if !keep {
                removed.push(k.clone());
            }
            keep
        });
        removed
    }

    /// Selectable choices for the given catalog entry.
    pub fn choices(&self, catalog: &CatalogEntry) -> Vec<FilterChoice> {
        catalog
            .keys
            .iter()
            .map(|(key, values)| FilterChoice {
                key: key.clone(),
                values: values.clone(),
                selected: self.active.get(key).cloned(),
            })
            .collect()
    }

    /// The `metadata_filters` field of a chat request.
    pub fn to_query_payload(&self) -> Option<BTreeMap<String, String>> {
        if self.active.is_empty() {
            None
        } else {
            Some(self.active.clone())
        }
    }
}
