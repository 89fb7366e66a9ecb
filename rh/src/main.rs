//! rsshub - background RSS poller
//!
//! CLI entry point for managing feeds and running the fetcher.

use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use feedstore::FeedStore;
use rsshub::cli::{Cli, Command, OutputFormat};
use rsshub::config::Config;
use rsshub::fetch::HttpFetchClient;
use rsshub::repository::SqliteRepository;
use rsshub::scheduler::{Scheduler, SchedulerError};

fn parse_level(level: &str) -> Result<tracing::Level> {
    level
        .parse::<tracing::Level>()
        .map_err(|_| eyre::eyre!("Unknown log level: {}. Use: trace, debug, info, warn, or error", level))
}

fn setup_logging(cli_level: Option<&str>, config_level: Option<&str>) -> Result<()> {
    let level = match cli_level.or(config_level) {
        Some(level) => parse_level(level)?,
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let store = open_store(&config)?;

    // Dispatch command
    match cli.command {
        Command::Add { name, url } => cmd_add(&store, &name, &url),
        Command::SetInterval { interval } => cmd_set_interval(&config, store, &interval).await,
        Command::SetWorkers { count } => cmd_set_workers(&config, store, count).await,
        Command::List { num, format } => cmd_list(&store, num, format),
        Command::Delete { name } => cmd_delete(&store, &name),
        Command::Articles { feed, num, format } => cmd_articles(&store, feed.as_deref(), num, format),
        Command::Fetch => cmd_fetch(&config, store).await,
    }
}

/// Open the feed store and seed default settings
fn open_store(config: &Config) -> Result<Arc<FeedStore>> {
    let path = &config.storage.db_path;
    let store = FeedStore::open(path).context(format!("Failed to open feed store at {}", path.display()))?;
    store
        .seed_defaults(&config.fetch.default_interval, config.fetch.default_workers)
        .context("Failed to seed default settings")?;
    Ok(Arc::new(store))
}

fn build_scheduler(config: &Config, store: Arc<FeedStore>) -> Result<Scheduler> {
    let client = HttpFetchClient::new(&config.fetch).context("Failed to build HTTP client")?;
    Ok(Scheduler::new(
        Arc::new(SqliteRepository::new(store)),
        Arc::new(client),
        config.scheduler.clone(),
    ))
}

/// Register a feed
fn cmd_add(store: &FeedStore, name: &str, url: &str) -> Result<()> {
    let feed = store.add_feed(name, url)?;
    println!("{} Added feed {} ({})", "✓".green(), feed.name.cyan(), feed.url);
    Ok(())
}

/// Persist a new poll interval
async fn cmd_set_interval(config: &Config, store: Arc<FeedStore>, interval: &str) -> Result<()> {
    let scheduler = build_scheduler(config, store)?;
    let period = scheduler.set_interval(interval).await?;
    println!("{} Poll interval set to {:?}", "✓".green(), period);
    Ok(())
}

/// Persist a new worker count; a running fetcher applies it on its next tick
async fn cmd_set_workers(config: &Config, store: Arc<FeedStore>, count: usize) -> Result<()> {
    let scheduler = build_scheduler(config, store)?;
    scheduler.set_workers(count, &CancellationToken::new()).await?;
    println!("{} Worker count set to {}", "✓".green(), count);
    Ok(())
}

/// List feeds
fn cmd_list(store: &FeedStore, num: usize, format: OutputFormat) -> Result<()> {
    let feeds = store.list_feeds(num)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&feeds)?);
        }
        OutputFormat::Table => {
            println!("{:<6} {:<24} {:<20} URL", "ID", "NAME", "LAST FETCH");
            for feed in &feeds {
                println!(
                    "{:<6} {:<24} {:<20} {}",
                    feed.id,
                    feed.name,
                    feed.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    feed.url
                );
            }
        }
        OutputFormat::Text => {
            if feeds.is_empty() {
                println!("{}", "No feeds registered".dimmed());
            }
            for feed in &feeds {
                println!("{} {}", feed.name.cyan().bold(), feed.url);
                println!(
                    "  {} {}",
                    "added".dimmed(),
                    feed.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
        }
    }
    Ok(())
}

/// Delete a feed
fn cmd_delete(store: &FeedStore, name: &str) -> Result<()> {
    store.delete_feed(name)?;
    println!("{} Deleted feed {}", "✓".green(), name.cyan());
    Ok(())
}

/// Show stored articles
fn cmd_articles(store: &FeedStore, feed: Option<&str>, num: usize, format: OutputFormat) -> Result<()> {
    let articles = store.list_articles(feed, num)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&articles)?);
        }
        OutputFormat::Table => {
            println!("{:<6} {:<20} TITLE", "ID", "PUBLISHED");
            for article in &articles {
                let published = article
                    .published_at
                    .map(|p| p.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<6} {:<20} {}", article.id, published, article.title);
            }
        }
        OutputFormat::Text => {
            if articles.is_empty() {
                println!("{}", "No articles stored".dimmed());
            }
            for article in &articles {
                println!("{}", article.title.bold());
                if !article.link.is_empty() {
                    println!("  {}", article.link.yellow());
                }
                if let Some(published) = article.published_at {
                    println!("  {}", published.format("%Y-%m-%d %H:%M:%S").to_string().dimmed());
                }
            }
        }
    }
    Ok(())
}

/// Run the background fetcher until Ctrl-C or SIGTERM
async fn cmd_fetch(config: &Config, store: Arc<FeedStore>) -> Result<()> {
    let scheduler = build_scheduler(config, Arc::clone(&store))?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    println!("Background fetcher running (Ctrl-C to stop)...");
    match scheduler.start(cancel).await {
        Ok(()) => {
            println!("Background fetcher stopped");
            Ok(())
        }
        Err(SchedulerError::AlreadyRunning) => {
            let holder = store
                .singleton_holder_pid()
                .map(|pid| format!(" (PID: {})", pid))
                .unwrap_or_default();
            eprintln!("{} Background fetcher is already running{}", "✗".red(), holder);
            Err(SchedulerError::AlreadyRunning.into())
        }
        Err(e) => Err(e).context("Background fetcher failed"),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
