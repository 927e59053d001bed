//! Telegram Bot API transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::transport::{ChatTransport, OutgoingMessage};

/// Telegram rejects photo captions longer than this.
const MAX_CAPTION_CHARS: usize = 1024;

/// Used when a 429 carries no retry hint at all.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramTransport {
    /// `api_base` is normally `https://api.telegram.org`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn new(
        api_base: &str,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call<B: Serialize + Sync>(&self, method: &str, body: &B) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // The request URL embeds the bot token.
                TransportError::DeliveryFailed(format!("{method} request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body: Option<ApiResponse> = response.json().await.ok();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = body
                .as_ref()
                .and_then(|b| b.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .or(header_retry_after)
                .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
            return Err(TransportError::RateLimited { retry_after });
        }

        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(TransportError::DeliveryFailed(format!(
                "{method} returned {status}: {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
            None => Err(TransportError::DeliveryFailed(format!(
                "{method} returned {status} with an unreadable body"
            ))),
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.call(
            "sendMessage",
            &SendMessageRequest {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
            },
        )
        .await
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    /// Sends a photo with the text as caption when an image is present and the
    /// caption fits, otherwise a text message. A rejected photo (dead image
    /// URL, unsupported format) falls back to a text message.
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let Some(image_url) = message.image_url.as_deref() else {
            return self.send_text(&message.text).await;
        };
        if message.text.chars().count() > MAX_CAPTION_CHARS {
            return self.send_text(&message.text).await;
        }

        let photo = SendPhotoRequest {
            chat_id: &self.chat_id,
            photo: image_url,
            caption: &message.text,
            parse_mode: "HTML",
        };
        match self.call("sendPhoto", &photo).await {
            Err(TransportError::DeliveryFailed(reason)) => {
                tracing::warn!(image_url, reason = %reason, "sendPhoto rejected, falling back to text");
                self.send_text(&message.text).await
            }
            other => other,
        }
    }
}
