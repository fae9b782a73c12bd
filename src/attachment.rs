//! Reading files from disk into [`FileAttachment`]s.

use anyhow::{Context, Result};
use std::path::Path;

use ragchat_core::backend::FileAttachment;

/// Read `path` fully and guess its MIME type from the extension.
pub fn load_attachment(path: &Path) -> Result<FileAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string());
    Ok(FileAttachment::new(file_name, content_type, bytes))
}
