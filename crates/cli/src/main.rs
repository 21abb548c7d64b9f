//! Fresh Market CLI - operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Hash the shared back office password (reads it from stdin)
//! fm-cli hash-password
//!
//! # Fetch the spreadsheet feed and print the normalized products
//! fm-cli feed fetch --url https://example.com/feed.json
//!
//! # Print the offline member cache
//! fm-cli cache show
//!
//! # Run a scripted shopping session against an in-memory store
//! fm-cli demo
//! ```
//!
//! # Commands
//!
//! - `hash-password` - Print an Argon2 hash for `FRESH_MARKET_ADMIN_PASSWORD_HASH`
//! - `feed fetch` - Check a product feed
//! - `cache show` - Inspect the member cache
//! - `demo` - Shop, check out, and report with the sync engine

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fresh_market_storefront::StorefrontConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod commands;

#[derive(Parser)]
#[command(name = "fm-cli")]
#[command(author, version, about = "Fresh Market CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an Argon2 hash of a password read from stdin
    HashPassword,
    /// Product feed tools
    Feed {
        #[command(subcommand)]
        action: FeedAction,
    },
    /// Member cache tools
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run a scripted shopping session against an in-memory store
    Demo {
        /// Fail the first cart-clear write to show checkout recovery
        #[arg(long)]
        fail_clear: bool,

        /// Save the store contents as JSON when done
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FeedAction {
    /// Fetch the feed once and print the normalized products
    Fetch {
        /// Feed URL
        #[arg(short, long, env = "FRESH_MARKET_FEED_URL")]
        url: Url,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cached member list
    Show {
        /// Cache directory (defaults to `FRESH_MARKET_CACHE_DIR`)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    // Must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fresh_market_storefront=info,fresh_market_admin=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::HashPassword => commands::password::hash_from_stdin()?,
        Commands::Feed { action } => match action {
            FeedAction::Fetch { url } => commands::feed::fetch(url).await?,
        },
        Commands::Cache { action } => match action {
            CacheAction::Show { dir } => {
                commands::cache::show(&dir.unwrap_or(config.cache_dir)).await?;
            }
        },
        Commands::Demo { fail_clear, save } => {
            commands::demo::run(&config, fail_clear, save.as_deref()).await?;
        }
    }
    Ok(())
}
