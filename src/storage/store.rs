use async_trait::async_trait;

use super::schema::Database;
use super::types::{DatabaseError, Notification, SubscribedSeries};

/// Persistence operations the discovery engine needs.
///
/// [`Database`] is the production implementation; tests may substitute
/// their own to inject failures.
#[async_trait]
pub trait Store: Send + Sync {
    /// Up to `limit` series with at least one subscriber and an id greater
    /// than `after`, ordered by id.
    async fn list_subscribed_series(
        &self,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SubscribedSeries>, DatabaseError>;

    /// Distinct users subscribed to any of `series_ids`.
    async fn subscribers(&self, series_ids: &[i64]) -> Result<Vec<i64>, DatabaseError>;

    async fn notification_exists(
        &self,
        series_id: i64,
        season: i64,
        episode: i64,
    ) -> Result<bool, DatabaseError>;

    /// Records the episodes atomically. Fails if any of them is already recorded.
    async fn insert_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError>;

    /// Attaches the id of the chat message that announced the episodes.
    async fn set_notification_message_id(
        &self,
        notifications: &[Notification],
        message_id: i64,
    ) -> Result<(), DatabaseError>;

    async fn delete_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError>;

    /// Removes all subscriptions of `series_ids`, keeping the series rows.
    /// Returns the number of subscriptions removed.
    async fn delete_subscriptions_for_series(
        &self,
        series_ids: &[i64],
    ) -> Result<u64, DatabaseError>;
}

#[async_trait]
impl Store for Database {
    async fn list_subscribed_series(
        &self,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SubscribedSeries>, DatabaseError> {
        self.subscribed_series_page(after, limit).await
    }

    async fn subscribers(&self, series_ids: &[i64]) -> Result<Vec<i64>, DatabaseError> {
        self.subscribers_of(series_ids).await
    }

    async fn notification_exists(
        &self,
        series_id: i64,
        season: i64,
        episode: i64,
    ) -> Result<bool, DatabaseError> {
        self.notification_is_recorded(series_id, season, episode)
            .await
    }

    async fn insert_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError> {
        self.insert_notification_rows(notifications).await
    }

    async fn set_notification_message_id(
        &self,
        notifications: &[Notification],
        message_id: i64,
    ) -> Result<(), DatabaseError> {
        self.stamp_notification_rows(notifications, message_id)
            .await
    }

    async fn delete_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError> {
        self.delete_notification_rows(notifications).await
    }

    async fn delete_subscriptions_for_series(
        &self,
        series_ids: &[i64],
    ) -> Result<u64, DatabaseError> {
        self.delete_subscriptions_of(series_ids).await
    }
}
