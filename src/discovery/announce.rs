//! Chat message bodies for new episodes and finished series.

use std::time::Duration;

use crate::metadata::{image_url, EpisodeDetails, SeriesDetails, SeriesStatus};
use crate::notify::{
    Embed, EmbedAuthor, EmbedField, EmbedFooter, EmbedImage, OutgoingMessage, MAX_CONTENT_CHARS,
    MAX_EMBED_TOTAL_CHARS, MAX_MENTIONED_USERS,
};
use crate::util::{human_duration, mentions_within, truncate_chars};

const EMBED_COLOR: u32 = 0x01B4E4;
const FINISHED_COLOR: u32 = 0x8B0000;

// Discord embed limits
const MAX_TITLE: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;

// Discord allows 4096, but one episode embed must fit the per-message
// total on its own.
const MAX_OVERVIEW: usize = 2048;

const POSTER_SIZE: &str = "w300";
const STILL_SIZE: &str = "w780";
const LOGO_SIZE: &str = "w45";

pub(crate) fn episode_embed(
    series: &SeriesDetails,
    season_number: i64,
    episode: &EpisodeDetails,
    subscribers: &[i64],
) -> Embed {
    let mut fields = vec![
        EmbedField::inline("Season", season_number.to_string()),
        EmbedField::inline("Episode", episode.episode_number.to_string()),
    ];
    if let Some(minutes) = episode.runtime_minutes() {
        let runtime = human_duration(Duration::from_secs(u64::from(minutes) * 60));
        fields.push(EmbedField::inline("Runtime", runtime));
    }
    fields.push(EmbedField::block(
        "Watchers",
        mentions_within(subscribers, MAX_FIELD_VALUE).0,
    ));

    let title = if episode.name.trim().is_empty() {
        format!("Episode {}", episode.episode_number)
    } else {
        episode.name.clone()
    };

    Embed {
        title: Some(truncate_chars(&title, MAX_TITLE).into_owned()),
        description: episode
            .overview()
            .map(|o| truncate_chars(o, MAX_OVERVIEW).into_owned()),
        color: Some(EMBED_COLOR),
        author: Some(EmbedAuthor {
            name: truncate_chars(&series.name, MAX_TITLE).into_owned(),
            url: series.homepage().map(str::to_string),
        }),
        thumbnail: series.poster().map(|p| EmbedImage {
            url: image_url(POSTER_SIZE, p),
            width: None,
        }),
        image: episode.still().map(|p| EmbedImage {
            url: image_url(STILL_SIZE, p),
            width: None,
        }),
        footer: series.networks.first().map(|n| EmbedFooter {
            text: truncate_chars(&n.name, MAX_TITLE).into_owned(),
            icon_url: n
                .logo_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| image_url(LOGO_SIZE, p)),
        }),
        fields,
        ..Default::default()
    }
}

/// Sizes of consecutive runs of `embeds` whose combined text fits in one
/// message. An embed is never split, so every run holds at least one.
pub(crate) fn length_groups(embeds: &[Embed]) -> Vec<usize> {
    let mut groups = Vec::new();
    let mut count = 0;
    let mut total = 0;
    for embed in embeds {
        let len = embed.text_len();
        if count > 0 && total + len > MAX_EMBED_TOTAL_CHARS {
            groups.push(count);
            count = 0;
            total = 0;
        }
        count += 1;
        total += len;
    }
    if count > 0 {
        groups.push(count);
    }
    groups
}

/// Content and allowed mentions for `subscribers`, clipped to what one
/// message can carry.
fn addressed_to(subscribers: &[i64]) -> (String, Vec<i64>) {
    let cap = subscribers.len().min(MAX_MENTIONED_USERS);
    let (content, mentioned) = mentions_within(&subscribers[..cap], MAX_CONTENT_CHARS);
    if mentioned.len() < subscribers.len() {
        tracing::warn!(
            subscribers = subscribers.len(),
            mentioned = mentioned.len(),
            "Too many subscribers to mention in one message"
        );
    }
    (content, mentioned.to_vec())
}

/// A batch of episode embeds addressed to `subscribers`.
pub(crate) fn episodes_message(embeds: Vec<Embed>, subscribers: Vec<i64>) -> OutgoingMessage {
    let (content, mentioned_user_ids) = addressed_to(&subscribers);
    OutgoingMessage {
        content,
        embeds,
        mentioned_user_ids,
    }
}

/// One announcement covering every series that ended or was cancelled
/// during a pass.
pub(crate) fn finished_message(
    finished: &[(String, SeriesStatus)],
    subscribers: Vec<i64>,
) -> OutgoingMessage {
    let names = |wanted: &SeriesStatus| -> Vec<&str> {
        finished
            .iter()
            .filter(|(_, status)| status == wanted)
            .map(|(name, _)| name.as_str())
            .collect()
    };

    let mut fields = Vec::new();
    for (label, status) in [
        ("Cancelled", SeriesStatus::Canceled),
        ("Ended", SeriesStatus::Ended),
    ] {
        let list = names(&status);
        if !list.is_empty() {
            fields.push(EmbedField::block(
                label,
                truncate_chars(&list.join("\n"), MAX_FIELD_VALUE),
            ));
        }
    }

    let embed = Embed {
        title: Some("Finished series".into()),
        description: Some(
            "These series will not get new episodes. They have been removed from your watchlists."
                .into(),
        ),
        color: Some(FINISHED_COLOR),
        fields,
        ..Default::default()
    };

    let (content, mentioned_user_ids) = addressed_to(&subscribers);
    OutgoingMessage {
        content,
        embeds: vec![embed],
        mentioned_user_ids,
    }
}
