//! Notification dispatcher.
//!
//! Delivers change events after their category's transaction has committed,
//! either one by one ([`NotifyMode::Instant`]) or through a bounded buffer
//! flushed in bursts ([`NotifyMode::Batched`]). Undeliverable events land in
//! the dead-letter log and are retried by [`Dispatcher::retry_dead_letters`].

use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{AppConfig, ChangeEvent, NotifyMode, RetryPolicy};
use tokio::sync::Mutex;

use crate::audit::ChangeLog;
use crate::buffer::NotificationBuffer;
use crate::dead_letter::{DeadLetter, DeadLetterStore};
use crate::error::TransportError;
use crate::format::format_event;
use crate::transport::{ChatTransport, OutgoingMessage};

/// Consecutive rate-limit waits tolerated for one message.
pub const MAX_RATE_LIMIT_WAITS: u32 = 10;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub mode: NotifyMode,
    pub buffer_size: usize,
    pub flush_interval: Duration,
    /// Pause between consecutive sends of a burst.
    pub send_delay: Duration,
    /// Immediate attempts per delivery before dead-lettering.
    pub delivery_retry: RetryPolicy,
    pub max_rate_limit_waits: u32,
    /// Retry passes an entry gets before it is dropped.
    pub dead_letter_max_retries: u32,
}

impl DispatcherSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            mode: config.notify_mode,
            buffer_size: config.notify_buffer_size,
            flush_interval: Duration::from_secs(config.notify_flush_interval_secs),
            send_delay: Duration::from_millis(config.notify_send_delay_ms),
            delivery_retry: RetryPolicy::fixed(
                config.notify_max_attempts,
                Duration::from_millis(config.notify_retry_delay_ms),
            ),
            max_rate_limit_waits: MAX_RATE_LIMIT_WAITS,
            dead_letter_max_retries: config.dead_letter_max_retries,
        }
    }
}

/// What happened to a batch of events handed to the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: u32,
    pub dead_lettered: u32,
    /// Left in the buffer for a later flush.
    pub queued: u32,
}

impl DispatchReport {
    fn absorb(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.dead_lettered += other.dead_lettered;
        self.queued = other.queued;
    }
}

/// Outcome of one pass over the dead-letter log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPassReport {
    pub attempted: u32,
    pub delivered: u32,
    pub requeued: u32,
    /// Entries that exhausted their retries and were removed.
    pub dropped: u32,
}

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    dead_letters: Arc<dyn DeadLetterStore>,
    change_log: Option<ChangeLog>,
    settings: DispatcherSettings,
    buffer: Mutex<NotificationBuffer>,
    /// Serializes dead-letter appends against retry passes.
    dead_letter_lock: Mutex<()>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dead_letters: Arc<dyn DeadLetterStore>,
        settings: DispatcherSettings,
    ) -> Self {
        let buffer = NotificationBuffer::new(settings.buffer_size, settings.flush_interval);
        Self {
            transport,
            dead_letters,
            change_log: None,
            settings,
            buffer: Mutex::new(buffer),
            dead_letter_lock: Mutex::new(()),
        }
    }

    /// Also append every dispatched event to `change_log`.
    #[must_use]
    pub fn with_change_log(mut self, change_log: ChangeLog) -> Self {
        self.change_log = Some(change_log);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Hands over the events of one committed category run.
    ///
    /// Instant mode sends them now. Batched mode queues them and flushes if
    /// the buffer reached a bound.
    pub async fn dispatch(&self, events: Vec<ChangeEvent>) -> DispatchReport {
        if events.is_empty() {
            return DispatchReport::default();
        }

        if let Some(log) = &self.change_log {
            if let Err(e) = log.append(&events).await {
                tracing::warn!(path = %log.path().display(), error = %e, "failed to append change log");
            }
        }

        match self.settings.mode {
            NotifyMode::Instant => self.send_burst(events).await,
            NotifyMode::Batched => {
                let due = {
                    let mut buffer = self.buffer.lock().await;
                    for event in events {
                        buffer.push(event);
                    }
                    buffer.is_due()
                };
                if due {
                    self.flush().await
                } else {
                    DispatchReport {
                        queued: self.queued().await,
                        ..DispatchReport::default()
                    }
                }
            }
        }
    }

    /// Sends everything in the buffer.
    pub async fn flush(&self) -> DispatchReport {
        let events = self.buffer.lock().await.drain();
        if events.is_empty() {
            return DispatchReport::default();
        }
        tracing::info!(events = events.len(), "flushing notification buffer");
        let mut report = self.send_burst(events).await;
        report.queued = self.queued().await;
        report
    }

    /// Flushes only when the size or age bound has been reached.
    pub async fn flush_if_due(&self) -> DispatchReport {
        let due = self.buffer.lock().await.is_due();
        if due {
            self.flush().await
        } else {
            DispatchReport {
                queued: self.queued().await,
                ..DispatchReport::default()
            }
        }
    }

    pub async fn queued(&self) -> u32 {
        u32::try_from(self.buffer.lock().await.len()).unwrap_or(u32::MAX)
    }

    /// Sends a free-form message through the transport, honouring rate
    /// limits. Nothing is dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the last attempt.
    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.deliver(message).await
    }

    /// Re-attempts every dead-lettered event once.
    ///
    /// A failed entry has its counter incremented; once the counter reaches
    /// the configured maximum the entry is dropped and logged as permanently
    /// failed. Entries appended while the pass runs, by this process or
    /// another one sharing the log, are kept for the next pass.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`](crate::DeadLetterError) if the log cannot
    /// be read or rewritten.
    pub async fn retry_dead_letters(&self) -> Result<RetryPassReport, crate::DeadLetterError> {
        let _guard = self.dead_letter_lock.lock().await;
        let entries = self.dead_letters.load().await?;
        let mut report = RetryPassReport::default();
        if entries.is_empty() {
            return Ok(report);
        }

        let max_retries = self.settings.dead_letter_max_retries;
        let mut remaining = Vec::with_capacity(entries.len());

        for mut entry in entries.iter().cloned() {
            if entry.retry_count >= max_retries {
                tracing::error!(
                    product = %entry.event.product.key,
                    retry_count = entry.retry_count,
                    "dropping notification that exhausted its retries"
                );
                report.dropped += 1;
                continue;
            }

            if report.attempted > 0 && !self.settings.send_delay.is_zero() {
                tokio::time::sleep(self.settings.send_delay).await;
            }
            report.attempted += 1;

            let message = format_event(&entry.event);
            match self.send_honouring_rate_limit(&message).await {
                Ok(()) => {
                    tracing::info!(product = %entry.event.product.key, "dead-lettered notification delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    entry.retry_count += 1;
                    entry.error = e.to_string();
                    entry.failed_at = chrono::Utc::now();
                    if entry.retry_count >= max_retries {
                        tracing::error!(
                            product = %entry.event.product.key,
                            retry_count = entry.retry_count,
                            error = %e,
                            "notification permanently failed"
                        );
                        report.dropped += 1;
                    } else {
                        tracing::warn!(
                            product = %entry.event.product.key,
                            retry_count = entry.retry_count,
                            error = %e,
                            "dead-lettered notification failed again"
                        );
                        report.requeued += 1;
                        remaining.push(entry);
                    }
                }
            }
        }

        self.dead_letters.settle(&entries, &remaining).await?;
        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            requeued = report.requeued,
            dropped = report.dropped,
            "dead-letter retry pass complete"
        );
        Ok(report)
    }

    async fn send_burst(&self, events: Vec<ChangeEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (i, event) in events.into_iter().enumerate() {
            if i > 0 && !self.settings.send_delay.is_zero() {
                tokio::time::sleep(self.settings.send_delay).await;
            }
            report.absorb(self.deliver_or_dead_letter(event).await);
        }
        report
    }

    async fn deliver_or_dead_letter(&self, event: ChangeEvent) -> DispatchReport {
        let message = format_event(&event);
        match self.deliver(&message).await {
            Ok(()) => {
                tracing::debug!(product = %event.product.key, kind = %event.kind, "notification delivered");
                DispatchReport {
                    delivered: 1,
                    ..DispatchReport::default()
                }
            }
            Err(e) => {
                tracing::warn!(
                    product = %event.product.key,
                    kind = %event.kind,
                    error = %e,
                    "notification failed, moving to dead-letter log"
                );
                let _guard = self.dead_letter_lock.lock().await;
                if let Err(store_err) = self
                    .dead_letters
                    .append(DeadLetter::new(event, e.to_string()))
                    .await
                {
                    tracing::error!(error = %store_err, "failed to write dead-letter entry");
                }
                DispatchReport {
                    dead_lettered: 1,
                    ..DispatchReport::default()
                }
            }
        }
    }

    /// Delivery with the configured immediate retries. Rate-limit waits
    /// happen inside each attempt and never consume one.
    async fn deliver(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.settings
            .delivery_retry
            .run(
                |e: &TransportError| matches!(e, TransportError::DeliveryFailed(_)),
                |_attempt| self.send_honouring_rate_limit(message),
            )
            .await
            .map_err(|e| e.source)
    }

    async fn send_honouring_rate_limit(
        &self,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let mut waits = 0u32;
        loop {
            match self.transport.send(message).await {
                Err(TransportError::RateLimited { retry_after })
                    if waits < self.settings.max_rate_limit_waits =>
                {
                    waits += 1;
                    tracing::info!(
                        retry_after_secs = retry_after.as_secs(),
                        waits,
                        "transport rate limited, waiting"
                    );
                    tokio::time::sleep(retry_after).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
