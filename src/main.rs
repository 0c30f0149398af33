use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use episodic::catalog::SeriesCatalog;
use episodic::config::Config;
use episodic::discovery::{DiscoverySettings, EpisodeDiscovery};
use episodic::logging;
use episodic::metadata::TmdbClient;
use episodic::notify::DiscordNotifier;
use episodic::scheduler::Scheduler;
use episodic::storage::{Database, DatabaseError, Series, Subscription};

/// Get the default config directory path (~/.config/episodic/)
fn default_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("episodic"))
}

#[derive(Parser, Debug)]
#[command(
    name = "episodic",
    version,
    about = "Announces newly aired TV episodes to a Discord channel"
)]
struct Args {
    /// Config file (default: ~/.config/episodic/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run discovery on a schedule until interrupted (default)
    Serve,
    /// Run one discovery pass now
    Discover,
    /// Forget every announced episode
    PurgeNotifications,
    /// Apply, roll back or create schema migrations
    Migrate {
        #[command(subcommand)]
        action: Option<MigrateAction>,
    },
    /// Manage a user's watchlist
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },
    /// Search TMDB for a series
    Search {
        query: String,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Undo the most recently applied migration
    Rollback,
    /// Write an empty up/down migration pair
    Add {
        name: String,
        #[arg(long, value_name = "DIR", default_value = "migrations")]
        dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum WatchlistAction {
    /// Subscribe a user to a series
    Add {
        series_id: i64,
        #[arg(long)]
        user: i64,
    },
    /// Unsubscribe a user from a series
    Remove {
        series_id: i64,
        #[arg(long)]
        user: i64,
    },
    /// List a user's series
    List {
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_dir, config_path) = match &args.config {
        Some(path) => (
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path.clone(),
        ),
        None => {
            let dir = default_config_dir()?;
            let path = dir.join("config.toml");
            (dir, path)
        }
    };

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env();

    let _log_guard = logging::init(config.log_dir.as_deref())
        .context("Failed to set up file logging")?;
    tracing::debug!(?config, "Effective configuration");

    let db_path = config.database_path(&config_dir);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, &db_path).await,
        Command::Discover => discover(&config, &db_path).await,
        Command::PurgeNotifications => {
            let db = open_database(&db_path).await?;
            let removed = db.delete_all_notifications().await?;
            println!("Deleted {removed} notification records");
            Ok(())
        }
        Command::Migrate { action } => migrate(action, &db_path).await,
        Command::Watchlist { action } => watchlist(&config, &db_path, action).await,
        Command::Search { query } => {
            let catalog = build_catalog(&config, http_client()?)?;
            let choices = catalog.search_series(&query).await?;
            if choices.is_empty() {
                println!("No series found for {query:?}");
            }
            for choice in choices {
                println!("{:>10}  {}", choice.id, choice.label);
            }
            Ok(())
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("episodic/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

async fn open_database(path: &str) -> Result<Database> {
    match Database::open(path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database {path}: {e}")),
    }
}

fn build_tmdb(config: &Config, http: reqwest::Client) -> Result<Arc<TmdbClient>> {
    let client = TmdbClient::new(
        http,
        &config.tmdb_base_url,
        config.tmdb_token()?,
        config.tmdb_language.clone(),
        config.tmdb_requests_per_second,
    )
    .context("Invalid TMDB settings")?;
    Ok(Arc::new(client))
}

fn build_catalog(config: &Config, http: reqwest::Client) -> Result<Arc<SeriesCatalog>> {
    let tmdb = build_tmdb(config, http)?;
    Ok(Arc::new(SeriesCatalog::new(
        tmdb,
        config.cache_capacity(),
        config.cache_ttl(),
    )))
}

async fn build_discovery(config: &Config, db_path: &str) -> Result<EpisodeDiscovery> {
    let http = http_client()?;
    let db = open_database(db_path).await?;
    let tmdb = build_tmdb(config, http.clone())?;
    let catalog = Arc::new(SeriesCatalog::new(
        tmdb.clone(),
        config.cache_capacity(),
        config.cache_ttl(),
    ));
    let notifier = DiscordNotifier::new(
        http,
        &config.discord_api_base_url,
        config.discord_token()?,
    )
    .context("Invalid Discord settings")?;

    let settings = DiscoverySettings {
        channel_id: config.channel_id()?,
        page_size: config.page_size,
        batch_size: config.batch_size,
    };

    Ok(EpisodeDiscovery::new(
        Arc::new(db),
        tmdb,
        Arc::new(notifier),
        catalog,
        settings,
    ))
}

/// Cancels `token` on Ctrl-C or SIGTERM.
fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        tracing::info!("Shutdown requested");
        token.cancel();
    });
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(config: &Config, db_path: &str) -> Result<()> {
    let engine = build_discovery(config, db_path).await?;
    let token = CancellationToken::new();
    cancel_on_shutdown(token.clone());

    let scheduler = Scheduler::new(Arc::new(engine), config.poll_interval());
    scheduler.run(token).await;
    Ok(())
}

async fn discover(config: &Config, db_path: &str) -> Result<()> {
    let engine = build_discovery(config, db_path).await?;
    let token = CancellationToken::new();
    cancel_on_shutdown(token.clone());

    let report = engine
        .find_new_episodes(&token)
        .await
        .context("Discovery pass failed")?;
    println!(
        "Scanned {} series ({} without subscribers): {} new episodes in {} messages, {} finished series",
        report.series_scanned,
        report.series_skipped,
        report.episodes_announced,
        report.messages_sent,
        report.finished_series
    );
    Ok(())
}

async fn migrate(action: Option<MigrateAction>, db_path: &str) -> Result<()> {
    match action {
        None => {
            let db = Database::connect(db_path).await?;
            db.migrate().await?;
            println!("Migrations applied");
        }
        Some(MigrateAction::Rollback) => {
            let db = Database::connect(db_path).await?;
            match db.rollback().await? {
                Some(version) => println!("Rolled back migration {version}"),
                None => println!("No applied migrations to roll back"),
            }
        }
        Some(MigrateAction::Add { name, dir }) => {
            let (up, down) = Database::migration_template(&dir, &name)
                .with_context(|| format!("Failed to create migration in {}", dir.display()))?;
            println!("Created {}", up.display());
            println!("Created {}", down.display());
        }
    }
    Ok(())
}

async fn watchlist(config: &Config, db_path: &str, action: WatchlistAction) -> Result<()> {
    let db = open_database(db_path).await?;

    match action {
        WatchlistAction::Add { series_id, user } => {
            let catalog = build_catalog(config, http_client()?)?;
            let details = catalog
                .series_details(series_id)
                .await
                .with_context(|| format!("Failed to look up series {series_id}"))?;

            db.upsert_series(&Series::new(
                series_id,
                details.name.clone(),
                details.poster_path.clone(),
            ))
            .await?;

            if db.add_subscription(&Subscription::new(series_id, user)).await? {
                println!("Added {} to the watchlist of {user}", details.name);
            } else {
                println!("{} is already on the watchlist of {user}", details.name);
            }
        }
        WatchlistAction::Remove { series_id, user } => {
            let outcome = db.remove_subscription(series_id, user).await?;
            if !outcome.removed {
                println!("Series {series_id} is not on the watchlist of {user}");
            } else if outcome.series_deleted {
                println!("Removed series {series_id}; nobody tracks it anymore");
            } else {
                println!("Removed series {series_id} from the watchlist of {user}");
            }
        }
        WatchlistAction::List { user } => {
            let entries = db.list_subscriptions_for_user(user).await?;
            if entries.is_empty() {
                println!("The watchlist of {user} is empty");
            }
            for entry in entries {
                println!("{:>10}  {}", entry.series_id, entry.name);
            }
        }
    }
    Ok(())
}
