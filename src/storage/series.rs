use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{
    DatabaseError, Series, SubscribedSeries, Subscription, Unsubscribed, WatchlistEntry,
};

impl Database {
    // ========================================================================
    // Series Operations
    // ========================================================================

    /// Insert a series, or refresh its name and poster if it is already
    /// tracked. `created_at` of an existing row is kept.
    pub async fn upsert_series(&self, series: &Series) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO series (id, name, poster_path, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                poster_path = excluded.poster_path
            "#,
        )
        .bind(series.id)
        .bind(&series.name)
        .bind(&series.poster_path)
        .bind(series.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_series(&self, id: i64) -> Result<Option<Series>, DatabaseError> {
        let series = sqlx::query_as::<_, Series>(
            "SELECT id, name, poster_path, created_at FROM series WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(series)
    }

    /// Delete a series together with its subscriptions and notifications.
    ///
    /// Returns `false` if the series was not tracked.
    pub async fn delete_series(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM series WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One keyset page of series that have at least one subscriber, ordered
    /// by id. `after` is the last id of the previous page.
    pub(crate) async fn subscribed_series_page(
        &self,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SubscribedSeries>, DatabaseError> {
        let rows = sqlx::query_as::<_, SubscribedSeries>(
            r#"
            SELECT s.id, s.name, MIN(sub.created_at) AS epoch
            FROM series s
            JOIN subscriptions sub ON sub.series_id = s.id
            WHERE s.id > ?
            GROUP BY s.id, s.name
            ORDER BY s.id
            LIMIT ?
            "#,
        )
        .bind(after.unwrap_or(i64::MIN))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Subscribe a user to a series. The series row must exist.
    ///
    /// Returns `false` if the user was already subscribed; the original
    /// subscription time is kept in that case.
    pub async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (series_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(subscription.series_id)
        .bind(subscription.user_id)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unsubscribe a user. The series row is deleted when its last
    /// subscriber leaves.
    pub async fn remove_subscription(
        &self,
        series_id: i64,
        user_id: i64,
    ) -> Result<Unsubscribed, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM subscriptions WHERE series_id = ? AND user_id = ?")
            .bind(series_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE series_id = ?")
                .bind(series_id)
                .fetch_one(&mut *tx)
                .await?;

        let series_deleted = if remaining == 0 {
            sqlx::query("DELETE FROM series WHERE id = ?")
                .bind(series_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0
        } else {
            false
        };

        tx.commit().await?;
        Ok(Unsubscribed {
            removed,
            series_deleted,
        })
    }

    /// Every series a user watches, ordered by name.
    pub async fn list_subscriptions_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<WatchlistEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, WatchlistEntry>(
            r#"
            SELECT s.id AS series_id, s.name, sub.created_at AS subscribed_at
            FROM subscriptions sub
            JOIN series s ON s.id = sub.series_id
            WHERE sub.user_id = ?
            ORDER BY s.name COLLATE NOCASE, s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct subscriber ids of any of `series_ids`, ascending.
    pub(crate) async fn subscribers_of(&self, series_ids: &[i64]) -> Result<Vec<i64>, DatabaseError> {
        if series_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT DISTINCT user_id FROM subscriptions WHERE series_id IN (");
        let mut separated = builder.separated(", ");
        for id in series_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY user_id");

        let users = builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// Drop every subscription of `series_ids`. Series rows stay.
    pub(crate) async fn delete_subscriptions_of(
        &self,
        series_ids: &[i64],
    ) -> Result<u64, DatabaseError> {
        if series_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM subscriptions WHERE series_id IN (");
        let mut separated = builder.separated(", ");
        for id in series_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Series, Subscription};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn series(id: i64, name: &str) -> Series {
        Series {
            id,
            name: name.to_string(),
            poster_path: None,
            created_at: 1_700_000_000,
        }
    }

    fn sub(series_id: i64, user_id: i64, created_at: i64) -> Subscription {
        Subscription {
            series_id,
            user_id,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_series_keeps_created_at() {
        let db = test_db().await;
        db.upsert_series(&series(1, "Old")).await.unwrap();

        let mut renamed = series(1, "New");
        renamed.poster_path = Some("/p.jpg".into());
        renamed.created_at = 1_800_000_000;
        db.upsert_series(&renamed).await.unwrap();

        let stored = db.get_series(1).await.unwrap().unwrap();
        assert_eq!(stored.name, "New");
        assert_eq!(stored.poster_path.as_deref(), Some("/p.jpg"));
        assert_eq!(stored.created_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_get_missing_series() {
        let db = test_db().await;
        assert_eq!(db.get_series(42).await.unwrap(), None);
        assert!(!db.delete_series(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_subscription_is_unique_per_pair() {
        let db = test_db().await;
        db.upsert_series(&series(1, "A")).await.unwrap();

        assert!(db.add_subscription(&sub(1, 10, 100)).await.unwrap());
        assert!(!db.add_subscription(&sub(1, 10, 200)).await.unwrap());

        let list = db.list_subscriptions_for_user(10).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].subscribed_at, 100);
    }

    #[tokio::test]
    async fn test_subscription_requires_series() {
        let db = test_db().await;
        assert!(db.add_subscription(&sub(99, 10, 100)).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_last_subscription_deletes_series() {
        let db = test_db().await;
        db.upsert_series(&series(1, "A")).await.unwrap();
        db.add_subscription(&sub(1, 10, 100)).await.unwrap();
        db.add_subscription(&sub(1, 20, 100)).await.unwrap();

        let first = db.remove_subscription(1, 10).await.unwrap();
        assert!(first.removed);
        assert!(!first.series_deleted);
        assert!(db.get_series(1).await.unwrap().is_some());

        let second = db.remove_subscription(1, 20).await.unwrap();
        assert!(second.removed);
        assert!(second.series_deleted);
        assert_eq!(db.get_series(1).await.unwrap(), None);

        let again = db.remove_subscription(1, 20).await.unwrap();
        assert!(!again.removed);
        assert!(!again.series_deleted);
    }

    #[tokio::test]
    async fn test_subscribed_series_page_keyset_and_epoch() {
        let db = test_db().await;
        for id in [3, 1, 2, 4] {
            db.upsert_series(&series(id, &format!("S{id}"))).await.unwrap();
        }
        db.add_subscription(&sub(1, 10, 500)).await.unwrap();
        db.add_subscription(&sub(1, 20, 300)).await.unwrap();
        db.add_subscription(&sub(2, 10, 700)).await.unwrap();
        db.add_subscription(&sub(4, 10, 900)).await.unwrap();
        // series 3 has no subscribers

        let page = db.subscribed_series_page(None, 2).await.unwrap();
        assert_eq!(
            page.iter().map(|s| (s.id, s.epoch)).collect::<Vec<_>>(),
            vec![(1, 300), (2, 700)]
        );

        let page = db.subscribed_series_page(Some(2), 2).await.unwrap();
        assert_eq!(page.iter().map(|s| s.id).collect::<Vec<_>>(), vec![4]);

        let page = db.subscribed_series_page(Some(4), 2).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_of_is_distinct() {
        let db = test_db().await;
        db.upsert_series(&series(1, "A")).await.unwrap();
        db.upsert_series(&series(2, "B")).await.unwrap();
        db.add_subscription(&sub(1, 30, 1)).await.unwrap();
        db.add_subscription(&sub(1, 10, 1)).await.unwrap();
        db.add_subscription(&sub(2, 10, 1)).await.unwrap();

        assert_eq!(db.subscribers_of(&[1, 2]).await.unwrap(), vec![10, 30]);
        assert_eq!(db.subscribers_of(&[2]).await.unwrap(), vec![10]);
        assert!(db.subscribers_of(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_subscriptions_keeps_series() {
        let db = test_db().await;
        db.upsert_series(&series(1, "A")).await.unwrap();
        db.upsert_series(&series(2, "B")).await.unwrap();
        db.add_subscription(&sub(1, 10, 1)).await.unwrap();
        db.add_subscription(&sub(1, 20, 1)).await.unwrap();
        db.add_subscription(&sub(2, 10, 1)).await.unwrap();

        assert_eq!(db.delete_subscriptions_of(&[1]).await.unwrap(), 2);
        assert!(db.get_series(1).await.unwrap().is_some());
        assert!(db.subscribers_of(&[1]).await.unwrap().is_empty());
        assert_eq!(db.subscribers_of(&[2]).await.unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_watchlist_is_sorted_by_name() {
        let db = test_db().await;
        db.upsert_series(&series(1, "zeta")).await.unwrap();
        db.upsert_series(&series(2, "Alpha")).await.unwrap();
        db.add_subscription(&sub(1, 10, 1)).await.unwrap();
        db.add_subscription(&sub(2, 10, 2)).await.unwrap();

        let names: Vec<String> = db
            .list_subscriptions_for_user(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }
}
