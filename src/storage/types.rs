use chrono::Utc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("The database is locked by another episodic process. Stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }

    pub(crate) fn from_migrate(err: sqlx::migrate::MigrateError) -> Self {
        let message = err.to_string();
        if is_lock_message(&message) {
            DatabaseError::InstanceLocked
        } else {
            DatabaseError::Migration(message)
        }
    }
}

// SQLITE_BUSY (5): database is locked
// SQLITE_LOCKED (6): database table is locked
// SQLITE_CANTOPEN (14): unable to open database file
fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Current time as Unix seconds, the unit every `created_at` column uses.
pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Rows
// ============================================================================

/// A tracked series.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub poster_path: Option<String>,
    /// When tracking began (Unix seconds).
    pub created_at: i64,
}

impl Series {
    pub fn new(id: i64, name: impl Into<String>, poster_path: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            poster_path,
            created_at: unix_now(),
        }
    }
}

/// One user watching one series.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Subscription {
    pub series_id: i64,
    pub user_id: i64,
    pub created_at: i64,
}

impl Subscription {
    pub fn new(series_id: i64, user_id: i64) -> Self {
        Self {
            series_id,
            user_id,
            created_at: unix_now(),
        }
    }
}

/// Record of an announced episode.
///
/// `message_id` is `None` while the announcement is being sent.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Notification {
    pub series_id: i64,
    pub season: i64,
    pub episode: i64,
    pub message_id: Option<i64>,
    pub created_at: i64,
}

impl Notification {
    pub fn new(series_id: i64, season: i64, episode: i64) -> Self {
        Self {
            series_id,
            season,
            episode,
            message_id: None,
            created_at: unix_now(),
        }
    }
}

/// A series with at least one subscriber, as walked by discovery.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SubscribedSeries {
    pub id: i64,
    pub name: String,
    /// Earliest subscription time (Unix seconds). Episodes that aired before
    /// this day are never announced.
    pub epoch: i64,
}

/// One line of a user's watchlist.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WatchlistEntry {
    pub series_id: i64,
    pub name: String,
    pub subscribed_at: i64,
}

/// Outcome of removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Unsubscribed {
    /// The (series, user) pair existed and was removed.
    pub removed: bool,
    /// The series had no subscribers left and its row was deleted.
    pub series_deleted: bool,
}
