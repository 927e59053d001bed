//! Append-only JSON Lines log of dispatched change events.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pricewatch_core::ChangeEvent;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

#[derive(Serialize)]
struct ChangeLogLine<'a> {
    logged_at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a ChangeEvent,
}

#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line per event.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or written.
    pub async fn append(&self, events: &[ChangeEvent]) -> std::io::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let logged_at = Utc::now();
        let mut buf = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buf, &ChangeLogLine { logged_at, event })?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await
    }
}
