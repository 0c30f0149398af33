//! The episode discovery pass.
//!
//! One pass walks every subscribed series, fetches its latest season, picks
//! the episodes that should be announced now and posts them in batches. The
//! notification log in the store is the only memory between passes: an
//! episode with a record is never announced again.
//!
//! Each flushed batch is written in three steps:
//! 1. the notification rows are inserted without a message id, reserving
//!    the episodes
//! 2. the message is sent
//! 3. the returned message id is stamped onto the reserved rows
//!
//! A failed send deletes the reservations again. A failed stamp keeps them,
//! so announcements are at-most-once.

mod announce;
mod eligibility;

use chrono::{DateTime, Local, TimeZone};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::SeriesCatalog;
use crate::metadata::{MetadataError, MetadataProvider, SeriesStatus};
use crate::notify::{Embed, Notifier, NotifyError, OutgoingMessage};
use crate::storage::{DatabaseError, Notification, Store, SubscribedSeries};
use crate::util::{Batcher, DualBatcher, Pager};

pub use eligibility::{is_eligible, COMPLETENESS_CUTOFF_HOUR};

/// Series rows requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Embeds per message; Discord accepts at most ten.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Series ids per subscription delete statement.
const UNSUBSCRIBE_CHUNK: usize = 100;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
    #[error("Discovery pass cancelled")]
    Cancelled,
}

/// Tunables of a pass.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Channel announcements are posted to.
    pub channel_id: i64,
    pub page_size: usize,
    pub batch_size: usize,
}

impl DiscoverySettings {
    pub fn new(channel_id: i64) -> Self {
        Self {
            channel_id,
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// What a completed pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub series_scanned: usize,
    /// Series listed as subscribed that had no subscribers when processed.
    pub series_skipped: usize,
    pub episodes_announced: usize,
    pub messages_sent: usize,
    pub finished_series: usize,
}

/// Counters shared with the batch sink.
#[derive(Default)]
struct Counters {
    episodes: AtomicUsize,
    messages: AtomicUsize,
}

pub struct EpisodeDiscovery {
    store: Arc<dyn Store>,
    provider: Arc<dyn MetadataProvider>,
    notifier: Arc<dyn Notifier>,
    catalog: Arc<SeriesCatalog>,
    settings: DiscoverySettings,
}

impl EpisodeDiscovery {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn MetadataProvider>,
        notifier: Arc<dyn Notifier>,
        catalog: Arc<SeriesCatalog>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            catalog,
            settings,
        }
    }

    /// Runs one pass at the local wall-clock time.
    pub async fn find_new_episodes(
        &self,
        token: &CancellationToken,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        self.find_new_episodes_at(token, Local::now()).await
    }

    /// Runs one pass as if it were `now`. Dates are compared in `now`'s zone.
    ///
    /// Batches flushed before an error or cancellation stay committed.
    pub async fn find_new_episodes_at<Tz>(
        &self,
        token: &CancellationToken,
        now: DateTime<Tz>,
    ) -> Result<DiscoveryReport, DiscoveryError>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        tracing::info!("Starting episode discovery pass");

        let mut report = DiscoveryReport::default();
        let counters = Counters::default();
        let mut finished: Vec<(i64, String, SeriesStatus)> = Vec::new();

        let store = &self.store;
        let limit = self.settings.page_size.max(1) as i64;
        let mut series_pager = Pager::new(move |_page: usize, prev: &[SubscribedSeries]| {
            let after = prev.last().map(|s| s.id);
            async move { store.list_subscribed_series(after, limit).await }
        });

        let counters_ref = &counters;
        let mut batch = DualBatcher::new(
            self.settings.batch_size,
            move |embeds: Vec<Embed>, notifications: Vec<Notification>| {
                self.announce_batch(embeds, notifications, counters_ref)
            },
        );

        loop {
            if token.is_cancelled() {
                tracing::info!(
                    series_scanned = report.series_scanned,
                    "Discovery pass cancelled"
                );
                return Err(DiscoveryError::Cancelled);
            }

            let Some(series) = series_pager.next().await? else {
                break;
            };
            report.series_scanned += 1;

            let subscribers = self.store.subscribers(&[series.id]).await?;
            if subscribers.is_empty() {
                tracing::warn!(series_id = series.id, name = %series.name, "Series has no subscribers, skipping");
                report.series_skipped += 1;
                continue;
            }

            let details = self.catalog.refresh_series_details(series.id).await?;
            let status = details.status();
            if status.is_finished() {
                tracing::info!(series_id = series.id, name = %details.name, status = ?status, "Series has finished");
                finished.push((series.id, details.name.clone(), status));
            }

            let season_number = details.number_of_seasons;
            if season_number <= 0 {
                tracing::debug!(series_id = series.id, "Series has no seasons yet");
                continue;
            }

            let season = self
                .provider
                .season_details(series.id, season_number)
                .await?;

            for episode in &season.episodes {
                if !is_eligible(episode, series.epoch, &now) {
                    continue;
                }
                if self
                    .store
                    .notification_exists(series.id, season_number, episode.episode_number)
                    .await?
                {
                    continue;
                }

                tracing::debug!(
                    series_id = series.id,
                    season_number,
                    episode_number = episode.episode_number,
                    "New episode"
                );
                let embed = announce::episode_embed(&details, season_number, episode, &subscribers);
                let notification =
                    Notification::new(series.id, season_number, episode.episode_number);
                batch.add(embed, notification).await?;
            }

            batch.flush().await?;
        }

        if !finished.is_empty() {
            self.retire_finished(&finished).await?;
            counters.messages.fetch_add(1, Ordering::Relaxed);
        }

        report.finished_series = finished.len();
        report.episodes_announced = counters.episodes.load(Ordering::Relaxed);
        report.messages_sent = counters.messages.load(Ordering::Relaxed);

        tracing::info!(
            series_scanned = report.series_scanned,
            series_skipped = report.series_skipped,
            episodes_announced = report.episodes_announced,
            messages_sent = report.messages_sent,
            finished_series = report.finished_series,
            "Episode discovery pass complete"
        );
        Ok(report)
    }

    /// Batch sink. Splits the batch where Discord's per-message embed text
    /// limit requires it, then announces each part.
    async fn announce_batch(
        &self,
        embeds: Vec<Embed>,
        notifications: Vec<Notification>,
        counters: &Counters,
    ) -> Result<(), DiscoveryError> {
        let groups = announce::length_groups(&embeds);
        let mut embeds = embeds.into_iter();
        let mut notifications = notifications.into_iter();
        for len in groups {
            let part: Vec<Embed> = embeds.by_ref().take(len).collect();
            let reserved: Vec<Notification> = notifications.by_ref().take(len).collect();
            self.announce_group(part, reserved, counters).await?;
        }
        Ok(())
    }

    /// Reserve, send, stamp.
    async fn announce_group(
        &self,
        embeds: Vec<Embed>,
        notifications: Vec<Notification>,
        counters: &Counters,
    ) -> Result<(), DiscoveryError> {
        let mut series_ids: Vec<i64> = notifications.iter().map(|n| n.series_id).collect();
        series_ids.sort_unstable();
        series_ids.dedup();
        let subscribers = self.store.subscribers(&series_ids).await?;

        self.store.insert_notifications(&notifications).await?;

        let message = announce::episodes_message(embeds, subscribers);
        let message_id = match self.send(&message).await {
            Ok(id) => id,
            Err(send_err) => {
                if let Err(e) = self.store.delete_notifications(&notifications).await {
                    tracing::error!(error = %e, "Failed to release notification reservations");
                }
                return Err(send_err.into());
            }
        };

        counters.messages.fetch_add(1, Ordering::Relaxed);
        counters
            .episodes
            .fetch_add(notifications.len(), Ordering::Relaxed);

        self.store
            .set_notification_message_id(&notifications, message_id)
            .await?;
        Ok(())
    }

    /// Announces the finished series, then drops their subscriptions.
    async fn retire_finished(
        &self,
        finished: &[(i64, String, SeriesStatus)],
    ) -> Result<(), DiscoveryError> {
        let ids: Vec<i64> = finished.iter().map(|(id, _, _)| *id).collect();
        let subscribers = self.store.subscribers(&ids).await?;

        let named: Vec<(String, SeriesStatus)> = finished
            .iter()
            .map(|(_, name, status)| (name.clone(), status.clone()))
            .collect();
        self.send(&announce::finished_message(&named, subscribers))
            .await?;

        let store = &self.store;
        let mut unsubscribe = Batcher::new(UNSUBSCRIBE_CHUNK, move |chunk: Vec<i64>| async move {
            let removed = store.delete_subscriptions_for_series(&chunk).await?;
            tracing::info!(series = chunk.len(), subscriptions = removed, "Removed subscriptions of finished series");
            Ok::<(), DiscoveryError>(())
        });
        for id in ids {
            unsubscribe.add(id).await?;
        }
        unsubscribe.flush().await?;
        Ok(())
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<i64, NotifyError> {
        self.notifier
            .send_message(self.settings.channel_id, message)
            .await
    }
}
