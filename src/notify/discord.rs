//! Discord bot notifier.
//!
//! Handles Discord's rate limiting the way Discord recommends:
//! - No hardcoded rate limits
//! - Retries on 429 responses respecting the `Retry-After` header

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{Notifier, NotifyError, OutgoingMessage};
use crate::util::validate_api_base;

/// Discord REST API, version 10.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
/// Longest server-requested wait honoured before giving up.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Subset of Discord's message object we read back.
#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Sends channel messages as a bot user.
pub struct DiscordNotifier {
    http: reqwest::Client,
    base: Url,
    token: SecretString,
}

impl DiscordNotifier {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: SecretString,
    ) -> Result<Self, NotifyError> {
        let base =
            validate_api_base(base_url).map_err(|e| NotifyError::InvalidBaseUrl(e.to_string()))?;
        Ok(Self { http, base, token })
    }

    /// Builds the JSON body of `POST /channels/{id}/messages`.
    ///
    /// Snowflakes go over the wire as strings. `allowed_mentions` disables
    /// implicit parsing so only the listed subscribers are pinged.
    fn build_payload(message: &OutgoingMessage) -> serde_json::Value {
        let users: Vec<String> = message
            .mentioned_user_ids
            .iter()
            .map(|id| id.to_string())
            .collect();

        let mut payload = json!({
            "allowed_mentions": {
                "parse": [],
                "users": users,
            }
        });

        if !message.content.is_empty() {
            payload["content"] = json!(message.content);
        }
        if !message.embeds.is_empty() {
            payload["embeds"] = json!(message.embeds);
        }

        payload
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(
        &self,
        url: Url,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, NotifyError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let request = self
                .http
                .post(url.clone())
                .header(
                    "Authorization",
                    format!("Bot {}", self.token.expose_secret()),
                )
                .json(payload);

            let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
                .await
                .map_err(|_| NotifyError::Timeout)?
                .map_err(NotifyError::Network)?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 {
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    tracing::warn!(
                        retries = MAX_RATE_LIMIT_RETRIES,
                        "Discord rate limit: max retries exceeded"
                    );
                    return Err(NotifyError::RateLimited(MAX_RATE_LIMIT_RETRIES));
                }

                let wait = match parse_retry_after(&response) {
                    Some(wait) if wait <= MAX_RETRY_AFTER => wait,
                    None => Duration::from_secs(1),
                    Some(_) => {
                        tracing::warn!(
                            attempt = attempts,
                            "Discord rate limit: requested wait too long, giving up"
                        );
                        return Err(NotifyError::RateLimited(attempts - 1));
                    }
                };
                tracing::debug!(
                    wait_ms = wait.as_millis() as u64,
                    attempt = attempts,
                    "Discord rate limited (429), waiting before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            // Other error - don't retry
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Discord message send failed");
            return Err(NotifyError::HttpStatus(status.as_u16(), body));
        }
    }
}

/// Reads the wait duration from a 429 response.
///
/// Values too large for a `Duration` saturate to `Duration::MAX` so the
/// caller treats them as over the limit.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    let secs = ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .find_map(|name| {
            let value = response.headers().get(*name)?.to_str().ok()?;
            value.trim().parse::<f64>().ok()
        })
        .filter(|secs| !secs.is_nan() && *secs >= 0.0)?;
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_message(
        &self,
        channel_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, NotifyError> {
        let url = self
            .base
            .join(&format!("channels/{channel_id}/messages"))
            .map_err(|e| NotifyError::InvalidBaseUrl(e.to_string()))?;

        let payload = Self::build_payload(message);
        let response = self.send_with_retry(url, &payload).await?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| NotifyError::Decode(e.to_string()))?;
        let id = created
            .id
            .parse::<i64>()
            .map_err(|e| NotifyError::Decode(format!("message id {:?}: {e}", created.id)))?;

        tracing::debug!(
            channel_id = channel_id,
            message_id = id,
            embeds = message.embeds.len(),
            "Discord message sent"
        );
        Ok(id)
    }
}
