use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

/// Schema migrations embedded at compile time from `migrations/`.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const IN_MEMORY: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and apply pending migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if a migration fails.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let db = Self::connect(path).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Open a database connection without touching the schema.
    ///
    /// Used by the migration commands, which manage the schema themselves.
    pub async fn connect(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if path != IN_MEMORY {
            prepare_db_file(Path::new(path));
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);

        // An in-memory database lives exactly as long as its one connection
        let pool_options = if path == IN_MEMORY {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            // SQLite is single-writer; 5 connections covers the scheduler plus
            // an interactive command running alongside it.
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(Self { pool })
    }

    /// Apply every pending migration. Already applied ones are skipped.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(DatabaseError::from_migrate)?;
        tracing::debug!("Database migrations applied");
        Ok(())
    }

    /// Undo the most recently applied migration.
    ///
    /// Returns the version that was rolled back, or `None` when nothing has
    /// been applied yet.
    pub async fn rollback(&self) -> Result<Option<i64>, DatabaseError> {
        let versions = self.applied_versions(2).await?;
        let Some(&latest) = versions.first() else {
            return Ok(None);
        };
        let target = versions.get(1).copied().unwrap_or(0);

        MIGRATOR
            .undo(&self.pool, target)
            .await
            .map_err(DatabaseError::from_migrate)?;
        tracing::info!(version = latest, "Rolled back migration");
        Ok(Some(latest))
    }

    /// Newest `limit` successfully applied migration versions, newest first.
    async fn applied_versions(&self, limit: i64) -> Result<Vec<i64>, DatabaseError> {
        let table_exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
        )
        .fetch_one(&self.pool)
        .await?;
        if table_exists == 0 {
            return Ok(Vec::new());
        }

        let versions = sqlx::query_scalar(
            "SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions)
    }

    /// Write an empty reversible migration pair into `dir`.
    ///
    /// Files are named `<YYYYMMDDHHMMSS>_<name>.up.sql` and `.down.sql`, the
    /// layout `sqlx::migrate!` reads. Existing files are never overwritten.
    pub fn migration_template(dir: &Path, name: &str) -> std::io::Result<(PathBuf, PathBuf)> {
        let slug = migration_slug(name);
        if slug.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "migration name must contain at least one letter or digit",
            ));
        }

        std::fs::create_dir_all(dir)?;
        let stem = format!("{}_{}", chrono::Utc::now().format("%Y%m%d%H%M%S"), slug);
        let up = dir.join(format!("{stem}.up.sql"));
        let down = dir.join(format!("{stem}.down.sql"));

        let templates = [
            (&up, "-- Add up migration script here\n"),
            (&down, "-- Add down migration script here\n"),
        ];
        for (path, header) in templates {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)?;
            file.write_all(header.as_bytes())?;
        }

        Ok((up, down))
    }
}

/// Lowercase `name`, collapsing every run of other characters into one `_`.
fn migration_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Create the parent directory and pre-create the file with mode 0600 so it
/// never exists with umask permissions.
#[cfg(unix)]
fn prepare_db_file(db_path: &Path) {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if db_path.exists() {
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(db_path, perms) {
            tracing::warn!(path = %db_path.display(), error = %e, "Failed to set database file permissions");
        }
        return;
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            return;
        }
    }

    // If creation fails, SQLite reports the error at connect time
    let _ = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(db_path);
}
