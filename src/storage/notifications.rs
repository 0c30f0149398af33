use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Notification};

/// Rows per multi-row INSERT; 5 binds each stays far below SQLite's limit.
const INSERT_CHUNK: usize = 100;

impl Database {
    // ========================================================================
    // Notification Operations
    // ========================================================================

    pub(crate) async fn notification_is_recorded(
        &self,
        series_id: i64,
        season: i64,
        episode: i64,
    ) -> Result<bool, DatabaseError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM notifications WHERE series_id = ? AND season = ? AND episode = ?",
        )
        .bind(series_id)
        .bind(season)
        .bind(episode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Insert all rows in one transaction. A row that already exists fails
    /// the whole insert, so an episode can only be reserved once.
    pub(crate) async fn insert_notification_rows(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in notifications.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO notifications (series_id, season, episode, message_id, created_at) ",
            );
            builder.push_values(chunk, |mut b, n| {
                b.push_bind(n.series_id)
                    .push_bind(n.season)
                    .push_bind(n.episode)
                    .push_bind(n.message_id)
                    .push_bind(n.created_at);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn stamp_notification_rows(
        &self,
        notifications: &[Notification],
        message_id: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for n in notifications {
            sqlx::query(
                "UPDATE notifications SET message_id = ? WHERE series_id = ? AND season = ? AND episode = ?",
            )
            .bind(message_id)
            .bind(n.series_id)
            .bind(n.season)
            .bind(n.episode)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn delete_notification_rows(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for n in notifications {
            sqlx::query("DELETE FROM notifications WHERE series_id = ? AND season = ? AND episode = ?")
                .bind(n.series_id)
                .bind(n.season)
                .bind(n.episode)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Notification records for one series, ordered by season and episode.
    pub async fn notifications_for_series(
        &self,
        series_id: i64,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT series_id, season, episode, message_id, created_at
            FROM notifications
            WHERE series_id = ?
            ORDER BY season, episode
            "#,
        )
        .bind(series_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Forget every announced episode. Returns the number of rows removed.
    pub async fn delete_all_notifications(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM notifications")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
