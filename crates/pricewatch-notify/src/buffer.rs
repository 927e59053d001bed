//! Bounded queue for batched notifications.

use std::collections::VecDeque;
use std::time::Duration;

use pricewatch_core::ChangeEvent;
use tokio::time::Instant;

/// Events waiting for the next batched flush.
///
/// A flush is due once the queue holds `capacity` events or its oldest event
/// has waited `max_age`, whichever comes first.
#[derive(Debug)]
pub struct NotificationBuffer {
    capacity: usize,
    max_age: Duration,
    queue: VecDeque<(Instant, ChangeEvent)>,
}

impl NotificationBuffer {
    #[must_use]
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            max_age,
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: ChangeEvent) {
        self.queue.push_back((Instant::now(), event));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Whether the size or age bound has been reached.
    #[must_use]
    pub fn is_due(&self) -> bool {
        if self.is_full() {
            return true;
        }
        self.queue
            .front()
            .is_some_and(|(queued_at, _)| queued_at.elapsed() >= self.max_age)
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.queue.drain(..).map(|(_, event)| event).collect()
    }
}
