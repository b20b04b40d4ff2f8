use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use spotlight::config::Config;
use spotlight::db::Database;
use spotlight::output::terminal;
use spotlight::pipeline::{featured, reputation};

/// Spotlight: engagement ranking and reputation for a content platform.
///
/// Picks the featured posts and keeps every author's reputation score in
/// step with the engagement their posts receive.
#[derive(Parser)]
#[command(name = "spotlight", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run the engagement ranker and mark the top posts as featured
    Feature {
        /// Number of posts to feature (default: SPOTLIGHT_FEATURED_COUNT or 3)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show the currently featured posts
    Featured,

    /// Recompute reputation for one user or for everyone
    Reputation {
        /// The user id to recompute
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        user: Option<i64>,

        /// Recompute every user
        #[arg(long)]
        all: bool,

        /// Number of users to aggregate in parallel (default: 8)
        #[arg(long, default_value = "8")]
        concurrency: usize,
    },

    /// Show users ranked by reputation
    Leaderboard {
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show a user's notifications, newest first
    Notifications {
        #[arg(long)]
        user: i64,

        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show system status (DB stats, last job runs)
    Status,

    /// Start the HTTP trigger server
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on (default: 8080, or PORT env var)
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spotlight=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing Spotlight database...");
            let config = Config::load()?;
            let db = init_database(&config).await?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", db_display(&config));
            println!("Tables created: {table_count}");
            println!("\nSpotlight is ready. Next step: run `spotlight feature`");
        }

        Commands::Feature { count } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let k = count.unwrap_or(config.featured_count);
            let outcome = featured::run(db.as_ref(), k, config.view_counting).await?;
            terminal::display_feature_outcome(&outcome);
        }

        Commands::Featured => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let posts = db.get_featured_posts(config.view_counting).await?;
            terminal::display_featured(&posts);
        }

        Commands::Reputation {
            user,
            all,
            concurrency,
        } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let settings = reputation::ReputationSettings::from(&config);

            if all {
                println!("Recomputing reputation for all users ({concurrency} concurrent)...");
                let outcome = reputation::recompute_all(db.as_ref(), &settings, concurrency).await?;
                terminal::display_batch_outcome(&outcome);
            } else if let Some(user_id) = user {
                let value = reputation::recompute_user(db.as_ref(), user_id, &settings).await?;
                println!(
                    "{} User {} reputation: {}",
                    "✓".green().bold(),
                    user_id,
                    value.to_string().bold()
                );
            }
        }

        Commands::Leaderboard { limit } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let users = db.get_leaderboard(limit).await?;
            terminal::display_leaderboard(&users);
        }

        Commands::Notifications { user, limit } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            if db.get_user(user).await?.is_none() {
                anyhow::bail!("User {user} not found");
            }
            let records = db.get_notifications(user, limit).await?;
            terminal::display_notifications(&records);
        }

        Commands::Status => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            spotlight::status::show(
                &db,
                &db_display(&config),
                !config.uses_postgres(),
                config.view_counting,
            )
            .await?;
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            config.require_cron_secret()?;
            let db = open_database(&config).await?;
            spotlight::web::run_server(config, db, port, &bind).await?;
        }
    }

    Ok(())
}

/// Build a display-friendly identifier for the database. For PostgreSQL,
/// redact the password from the connection URL before printing it.
fn db_display(config: &Config) -> String {
    match config.database_url.as_deref() {
        Some(url) if config.uses_postgres() => match url.rfind('@') {
            Some(at) => {
                let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
                format!("{}****@{}", &url[..scheme_end], &url[at + 1..])
            }
            None => url.to_string(),
        },
        _ => config.db_path.clone(),
    }
}

/// Open the configured database backend.
///
/// PostgreSQL when DATABASE_URL is a postgres:// URL, otherwise the
/// SQLite file (which must already exist).
async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    if config.uses_postgres() {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            let url = config.database_url.as_deref().unwrap_or_default();
            return spotlight::db::connect_postgres(url).await;
        }
        #[cfg(not(feature = "postgres"))]
        anyhow::bail!(
            "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
             Rebuild with: cargo build --features postgres"
        );
    }
    open_sqlite(config)
}

/// Like `open_database`, but creates the SQLite file if it's missing.
async fn init_database(config: &Config) -> Result<Arc<dyn Database>> {
    if config.uses_postgres() {
        return open_database(config).await;
    }
    init_sqlite(config)
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    spotlight::db::open_sqlite(&config.db_path)
}

#[cfg(feature = "sqlite")]
fn init_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    spotlight::db::initialize_sqlite(&config.db_path)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &Config) -> Result<Arc<dyn Database>> {
    anyhow::bail!(
        "No database configured. Set DATABASE_URL to a postgres:// URL, \
         or rebuild with the 'sqlite' feature."
    )
}

#[cfg(not(feature = "sqlite"))]
fn init_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    open_sqlite(config)
}
