//! Per-namespace metadata catalog.
//!
//! The catalog lists, for each namespace, the metadata keys seen on
//! ingested documents and their distinct values. It feeds the filter
//! choices offered to the user.
//!
//! Refreshes are fire-and-forget: a failure is logged and the previous
//! entry is kept. Because fetches for different namespaces are not
//! serialized, every refresh is stamped with a [`RefreshTicket`]; only the
//! most recently issued ticket may update the catalog, so a slow response
//! for a namespace the user already left is dropped.

use std::collections::{BTreeMap, HashMap};

use crate::backend::{Backend, BackendError, MetadataStats};
use crate::models::display_value;

/// Known keys and observed values for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub namespace: String,
    pub keys: BTreeMap<String, Vec<String>>,
}

impl CatalogEntry {
    /// Build an entry from a stats response. Values are rendered as
    /// strings and de-duplicated, keeping first-seen order.
    pub fn from_stats(namespace: impl Into<String>, stats: MetadataStats) -> Self {
        let keys = stats
            .metadata_keys
            .into_iter()
            .map(|(key, values)| {
                let mut seen: Vec<String> = Vec::with_capacity(values.len());
                for v in values.iter().map(display_value) {
                    if !v.is_empty() && !seen.contains(&v) {
                        seen.push(v);
                    }
                }
                (key, seen)
            })
            .collect();
        Self {
            namespace: namespace.into(),
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.keys.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.values(key)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }
}

/// Proof that a refresh was started; hand it back to [`MetadataCatalog::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    namespace: String,
    generation: u64,
}

impl RefreshTicket {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Result of applying a fetch to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogUpdate {
    /// The entry for the ticket's namespace was replaced.
    Applied,
    /// A newer refresh was issued since; the response was dropped.
    Stale,
    /// The fetch failed; the previous entry was kept.
    Failed(BackendError),
}

/// Cache of [`CatalogEntry`] values keyed by namespace.
#[derive(Debug, Default)]
pub struct MetadataCatalog {
    entries: HashMap<String, CatalogEntry>,
    latest_generation: u64,
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached entry for `namespace`, or `None` if nothing was fetched yet.
    pub fn entry(&self, namespace: &str) -> Option<&CatalogEntry> {
        self.entries.get(namespace)
    }

    /// Start a refresh. Any ticket issued earlier becomes stale.
    pub fn begin_refresh(&mut self, namespace: &str) -> RefreshTicket {
        self.latest_generation += 1;
        RefreshTicket {
            namespace: namespace.to_string(),
            generation: self.latest_generation,
        }
    }

    /// Whether `ticket` is still the most recent refresh.
    pub fn is_current(&self, ticket: &RefreshTicket) -> bool {
        ticket.generation == self.latest_generation
    }

    /// Apply the outcome of a stats fetch.
    pub fn apply(
        &mut self,
        ticket: RefreshTicket,
        result: Result<MetadataStats, BackendError>,
    ) -> CatalogUpdate {
        if !self.is_current(&ticket) {
            tracing::debug!(
                namespace = %ticket.namespace,
                "discarding stale metadata stats response"
            );
            return CatalogUpdate::Stale;
        }
        match result {
            Ok(stats) => {
                let entry = CatalogEntry::from_stats(ticket.namespace.clone(), stats);
                self.entries.insert(ticket.namespace, entry);
                CatalogUpdate::Applied
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %ticket.namespace,
                    error = %e,
                    "failed to fetch metadata stats"
                );
                CatalogUpdate::Failed(e)
            }
        }
    }

    /// Fetch and apply in one step. Never returns an error to the caller.
    pub async fn refresh<B: Backend + ?Sized>(&mut self, backend: &B, namespace: &str) -> CatalogUpdate {
        let ticket = self.begin_refresh(namespace);
        let result = backend.metadata_stats(namespace).await;
        self.apply(ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Endpoint, InMemoryBackend};
    use serde_json::{json, Value};

    fn stats(pairs: &[(&str, &[&str])]) -> MetadataStats {
        MetadataStats {
            metadata_keys: pairs
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| Value::from(*v)).collect()))
                .collect(),
        }
    }

    #[test]
    fn test_entry_from_stats_dedupes_and_stringifies() {
        let raw = MetadataStats {
            metadata_keys: [(
                "page".to_string(),
                vec![json!(1), json!("1"), json!(2), json!(null)],
            )]
            .into_iter()
            .collect(),
        };
        let entry = CatalogEntry::from_stats("default", raw);
        assert_eq!(entry.values("page").unwrap(), ["1", "2"]);
        assert!(entry.contains("page", "2"));
        assert!(!entry.contains("page", "3"));
        assert!(!entry.contains("author", "1"));
    }

    #[test]
    fn test_apply_replaces_wholesale() {
        let mut catalog = MetadataCatalog::new();
        let t = catalog.begin_refresh("default");
        catalog.apply(t, Ok(stats(&[("author", &["Alice"]), ("year", &["2020"])])));
        let t = catalog.begin_refresh("default");
        catalog.apply(t, Ok(stats(&[("author", &["Bob"])])));

        let entry = catalog.entry("default").unwrap();
        assert_eq!(entry.keys.len(), 1);
        assert_eq!(entry.values("author").unwrap(), ["Bob"]);
    }

    #[test]
    fn test_failure_keeps_previous_entry() {
        let mut catalog = MetadataCatalog::new();
        let t = catalog.begin_refresh("default");
        catalog.apply(t, Ok(stats(&[("author", &["Alice"])])));

        let t = catalog.begin_refresh("default");
        let update = catalog.apply(t, Err(BackendError::Transport("down".into())));
        assert!(matches!(update, CatalogUpdate::Failed(_)));
        assert!(catalog.entry("default").unwrap().contains("author", "Alice"));
    }

    #[test]
    fn test_failure_without_previous_entry_leaves_no_data() {
        let mut catalog = MetadataCatalog::new();
        let t = catalog.begin_refresh("default");
        catalog.apply(t, Err(BackendError::Transport("down".into())));
        assert!(catalog.entry("default").is_none());
    }

    #[test]
    fn test_stale_response_discarded() {
        let mut catalog = MetadataCatalog::new();
        let for_a = catalog.begin_refresh("a");
        let for_b = catalog.begin_refresh("b");

        // b resolves first, then a's slow response arrives.
        assert_eq!(
            catalog.apply(for_b, Ok(stats(&[("kind", &["b-doc"])]))),
            CatalogUpdate::Applied
        );
        assert_eq!(
            catalog.apply(for_a, Ok(stats(&[("kind", &["a-doc"])]))),
            CatalogUpdate::Stale
        );
        assert!(catalog.entry("a").is_none());
        assert!(catalog.entry("b").unwrap().contains("kind", "b-doc"));
    }

    #[tokio::test]
    async fn test_refresh_never_errors() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Endpoint::MetadataStats, BackendError::Transport("down".into()));
        let mut catalog = MetadataCatalog::new();
        let update = catalog.refresh(&backend, "default").await;
        assert!(matches!(update, CatalogUpdate::Failed(_)));

        let update = catalog.refresh(&backend, "default").await;
        assert_eq!(update, CatalogUpdate::Applied);
        assert!(catalog.entry("default").unwrap().is_empty());
    }
}
