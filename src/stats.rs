//! Metadata catalog and backend health overview.
//!
//! `ragchat stats` prints the metadata keys and observed values for a
//! namespace, the same inventory the filter choices are built from.
//! `ragchat health` probes the backend's `/health` endpoint.

use anyhow::{Context, Result};
use std::io::Write;

use ragchat_core::backend::Backend;
use ragchat_core::catalog::CatalogEntry;

use crate::render::{OutputMode, NO_METADATA};

/// Print the catalog entry for `entry.namespace`.
pub fn write_catalog<W: Write>(out: &mut W, entry: &CatalogEntry) -> std::io::Result<()> {
    writeln!(out, "Metadata for namespace '{}'", entry.namespace)?;
    writeln!(out, "{}", "=".repeat(24 + entry.namespace.len()))?;
    if entry.is_empty() {
        return writeln!(out, "{}", NO_METADATA);
    }
    let width = entry.keys.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, values) in &entry.keys {
        writeln!(
            out,
            "  {:<width$}  {} value(s): {}",
            key,
            values.len(),
            values.join(", "),
            width = width
        )?;
    }
    Ok(())
}

/// Fetch and print the catalog for `namespace`.
pub async fn run_stats(backend: &dyn Backend, namespace: &str, mode: OutputMode) -> Result<()> {
    let stats = backend
        .metadata_stats(namespace)
        .await
        .with_context(|| format!("Failed to fetch metadata stats for namespace '{}'", namespace))?;

    if mode == OutputMode::Json {
        let body = serde_json::json!({
            "namespace": namespace,
            "metadata_keys": stats.metadata_keys,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let entry = CatalogEntry::from_stats(namespace, stats);
    write_catalog(&mut std::io::stdout().lock(), &entry)?;
    Ok(())
}

/// Probe the backend and print its status.
pub async fn run_health(backend: &dyn Backend, base_url: &str) -> Result<()> {
    let health = backend
        .health()
        .await
        .with_context(|| format!("Backend at {} is not reachable", base_url))?;
    match &health.version {
        Some(version) => println!("{}: {} (version {})", base_url, health.status, version),
        None => println!("{}: {}", base_url, health.status),
    }
    Ok(())
}
