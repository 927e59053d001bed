//! Chat transport capability.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// A formatted message ready for the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// HTML-formatted body.
    pub text: String,
    pub image_url: Option<String>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
        }
    }
}

/// Sends one message to the configured chat.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError>;
}

/// Transport used when no chat credentials are configured: messages are
/// only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl ChatTransport for LogTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        tracing::info!(
            image = message.image_url.as_deref().unwrap_or(""),
            text = %message.text,
            "notification (log transport)"
        );
        Ok(())
    }
}

/// In-memory transport that records deliveries and replays scripted
/// responses. Once the script is exhausted every send succeeds, unless
/// [`MemoryTransport::fail_always`] was called.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    script: VecDeque<Result<(), TransportError>>,
    fail_always: Option<String>,
    attempts: u32,
    delivered: Vec<OutgoingMessage>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for the next sends, in order.
    pub fn push_responses(&self, responses: impl IntoIterator<Item = Result<(), TransportError>>) {
        self.lock().script.extend(responses);
    }

    /// Every unscripted send fails with `reason`.
    pub fn fail_always(&self, reason: impl Into<String>) {
        self.lock().fail_always = Some(reason.into());
    }

    /// Unscripted sends succeed again.
    pub fn recover(&self) {
        self.lock().fail_always = None;
    }

    /// Number of `send` calls, successful or not.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Messages that were accepted, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<OutgoingMessage> {
        self.lock().delivered.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.attempts += 1;

        let outcome = match state.script.pop_front() {
            Some(scripted) => scripted,
            None => match &state.fail_always {
                Some(reason) => Err(TransportError::DeliveryFailed(reason.clone())),
                None => Ok(()),
            },
        };

        if outcome.is_ok() {
            state.delivered.push(message.clone());
        }
        outcome
    }
}
