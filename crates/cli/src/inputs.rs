//! Turning command-line paths into the ordered document list.

use anyhow::{Context, Result};
use pdf_to_png_core::is_pdf_path;
use std::path::PathBuf;
use tracing::warn;

/// Expand `paths` into PDF files, keeping argument order and duplicates.
///
/// Directories contribute their `.pdf` files (one level, sorted by name).
/// Files that are not PDFs are skipped with a warning. Paths that do not
/// exist are passed through so the job reports them per document.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file() && is_pdf_path(p))
                .collect();
            found.sort();

            if found.is_empty() {
                warn!("No PDF files found in {}", path.display());
            }
            documents.extend(found);
        } else if is_pdf_path(path) {
            documents.push(path.clone());
        } else {
            warn!("Skipping {}: not a .pdf file", path.display());
        }
    }

    Ok(documents)
}
