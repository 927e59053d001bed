//! Diagnostic snapshots of pages that did not look like listings.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// Writes `html` to `<dir>/<category>-p<page>-<timestamp>.html`.
///
/// # Errors
///
/// Returns the I/O error if the directory cannot be created or the file
/// cannot be written.
pub async fn write_snapshot(
    dir: &Path,
    category: &str,
    page: u32,
    html: &str,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(snapshot_file_name(category, page, Utc::now()));
    tokio::fs::write(&path, html).await?;
    Ok(path)
}

fn snapshot_file_name(category: &str, page: u32, at: chrono::DateTime<Utc>) -> String {
    let safe: String = category
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}-p{page}-{}.html", at.format("%Y%m%dT%H%M%S%3fZ"))
}
