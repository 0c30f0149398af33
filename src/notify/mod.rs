//! Outgoing chat announcements.
//!
//! [`Notifier`] is what the discovery engine talks to; [`DiscordNotifier`]
//! implements it with Discord's REST API. Message payloads are plain data
//! ([`OutgoingMessage`], [`Embed`]) so tests can record and inspect them.

mod discord;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use discord::{DiscordNotifier, DEFAULT_API_BASE};

/// Errors returned by a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: status {0}: {1}")]
    HttpStatus(u16, String),
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Longest plain text `content` Discord accepts.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Combined text of every embed in one message may not exceed this.
pub const MAX_EMBED_TOTAL_CHARS: usize = 6000;

/// Most users `allowed_mentions.users` may list.
pub const MAX_MENTIONED_USERS: usize = 100;

/// A message to post in a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    /// Plain text content, usually the subscriber mentions.
    pub content: String,
    pub embeds: Vec<Embed>,
    /// Users allowed to be pinged by this message. Anyone else mentioned in
    /// `content` or the embeds is rendered but not notified.
    pub mentioned_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// Characters Discord counts against [`MAX_EMBED_TOTAL_CHARS`]: title,
    /// description, author name, footer text and every field name and value.
    pub fn text_len(&self) -> usize {
        let chars = |s: &str| s.chars().count();
        self.title.as_deref().map_or(0, chars)
            + self.description.as_deref().map_or(0, chars)
            + self.author.as_ref().map_or(0, |a| chars(&a.name))
            + self.footer.as_ref().map_or(0, |f| chars(&f.text))
            + self
                .fields
                .iter()
                .map(|f| chars(&f.name) + chars(&f.value))
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }

    pub fn block(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: false,
        }
    }
}

/// Posts messages to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `message` to `channel_id` and returns the id of the created message.
    async fn send_message(
        &self,
        channel_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, NotifyError>;
}
