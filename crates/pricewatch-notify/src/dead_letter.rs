//! Durable log of notifications that could not be delivered.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricewatch_core::ChangeEvent;
use serde::{Deserialize, Serialize};

use crate::error::DeadLetterError;

/// One undelivered change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: ChangeEvent,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    /// Retry passes that have already failed for this entry.
    pub retry_count: u32,
}

impl DeadLetter {
    #[must_use]
    pub fn new(event: ChangeEvent, error: impl Into<String>) -> Self {
        Self {
            event,
            error: error.into(),
            failed_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Storage for [`DeadLetter`] entries.
///
/// `append` and `settle` are each atomic against the log, so a retry pass
/// that took a snapshot with `load` never loses entries appended while it was
/// sending.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn load(&self) -> Result<Vec<DeadLetter>, DeadLetterError>;

    async fn append(&self, entry: DeadLetter) -> Result<(), DeadLetterError>;

    /// Removes the `taken` entries still in the log and appends `requeued`.
    /// Entries written since `taken` was loaded are kept.
    async fn settle(
        &self,
        taken: &[DeadLetter],
        requeued: &[DeadLetter],
    ) -> Result<(), DeadLetterError>;
}

fn settle_entries(
    mut current: Vec<DeadLetter>,
    taken: &[DeadLetter],
    requeued: &[DeadLetter],
) -> Vec<DeadLetter> {
    for entry in taken {
        if let Some(pos) = current.iter().position(|c| c == entry) {
            current.remove(pos);
        }
    }
    current.extend_from_slice(requeued);
    current
}

/// How long a writer waits for another process's lock file.
const LOCK_WAIT: Duration = Duration::from_secs(10);
/// A lock file older than this is left over from a crashed process.
const STALE_LOCK: Duration = Duration::from_secs(120);
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Dead-letter log kept as a JSON array on disk.
///
/// Every write goes to a sibling temp file that is then renamed over the log,
/// so a crash never leaves a half-written file behind. Read-modify-write
/// cycles hold a sibling `.lock` file, which keeps a daemon and a separate
/// `retry-failed` run from overwriting each other's entries.
#[derive(Debug, Clone)]
pub struct JsonFileDeadLetters {
    path: PathBuf,
    lock_wait: Duration,
}

/// Removes the lock file when dropped.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove dead-letter lock file"
            );
        }
    }
}

impl JsonFileDeadLetters {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_wait: LOCK_WAIT,
        }
    }

    /// Overrides how long a write waits for a lock held elsewhere.
    #[must_use]
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> DeadLetterError {
        DeadLetterError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn ensure_parent(&self) -> Result<(), DeadLetterError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    /// Takes the lock file, waiting up to `lock_wait` for another holder and
    /// breaking locks older than [`STALE_LOCK`].
    async fn lock(&self) -> Result<LockFile, DeadLetterError> {
        self.ensure_parent().await?;
        let lock_path = self.lock_path();
        let deadline = tokio::time::Instant::now() + self.lock_wait;

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(LockFile { path: lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(self.io_error(e)),
            }

            if self.lock_is_stale(&lock_path).await {
                tracing::warn!(path = %lock_path.display(), "removing stale dead-letter lock file");
                match tokio::fs::remove_file(&lock_path).await {
                    Ok(()) => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(self.io_error(e)),
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(DeadLetterError::Locked { path: lock_path });
            }
            tokio::time::sleep(LOCK_POLL).await;
        }
    }

    async fn lock_is_stale(&self, lock_path: &Path) -> bool {
        let Ok(metadata) = tokio::fs::metadata(lock_path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_LOCK)
    }

    async fn write_all(&self, entries: &[DeadLetter]) -> Result<(), DeadLetterError> {
        self.ensure_parent().await?;

        let json = serde_json::to_vec_pretty(entries).map_err(|e| DeadLetterError::Parse {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp = self.sibling(".tmp");

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl DeadLetterStore for JsonFileDeadLetters {
    async fn load(&self) -> Result<Vec<DeadLetter>, DeadLetterError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| DeadLetterError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn append(&self, entry: DeadLetter) -> Result<(), DeadLetterError> {
        let _lock = self.lock().await?;
        let mut entries = self.load().await?;
        entries.push(entry);
        self.write_all(&entries).await
    }

    async fn settle(
        &self,
        taken: &[DeadLetter],
        requeued: &[DeadLetter],
    ) -> Result<(), DeadLetterError> {
        let _lock = self.lock().await?;
        let current = self.load().await?;
        self.write_all(&settle_entries(current, taken, requeued)).await
    }
}

/// Process-local dead-letter log.
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    entries: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeadLetter>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetters {
    async fn load(&self) -> Result<Vec<DeadLetter>, DeadLetterError> {
        Ok(self.snapshot())
    }

    async fn append(&self, entry: DeadLetter) -> Result<(), DeadLetterError> {
        self.lock().push(entry);
        Ok(())
    }

    async fn settle(
        &self,
        taken: &[DeadLetter],
        requeued: &[DeadLetter],
    ) -> Result<(), DeadLetterError> {
        let mut entries = self.lock();
        let current = std::mem::take(&mut *entries);
        *entries = settle_entries(current, taken, requeued);
        Ok(())
    }
}

#[cfg(test)]
#[path = "dead_letter_test.rs"]
mod tests;
