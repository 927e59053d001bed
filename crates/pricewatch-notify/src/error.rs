use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`ChatTransport`](crate::ChatTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server asked us to slow down. Not a delivery failure: the caller
    /// waits `retry_after` and sends again.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead-letter log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dead-letter log is locked by another process ({path})")]
    Locked { path: PathBuf },

    #[error("dead-letter log at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
