//! skyrelay-hn - Relay Hacker News top stories to Bluesky
//!
//! Polls the top stories list and posts every story it has not posted
//! before, remembering what it posted in a local SQLite database.

use clap::Parser;
use libskyrelay::config::Config;
use libskyrelay::logging::{LogFormat, LoggingConfig};
use libskyrelay::platforms::bluesky::BlueskyClient;
use libskyrelay::source::hackernews::HackerNewsClient;
use libskyrelay::{Database, FailurePolicy, Poller, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "skyrelay-hn")]
#[command(version)]
#[command(about = "Relay Hacker News top stories to a Bluesky account")]
#[command(long_about = "\
skyrelay-hn - Relay Hacker News top stories to a Bluesky account

DESCRIPTION:
    Every interval, skyrelay-hn refreshes the Bluesky session, fetches the
    Hacker News top stories, and posts each of the first N stories that it
    has not posted before as a link card. Posted story ids are stored in a
    SQLite database, so restarts never post a story twice.

USAGE:
    # Run in foreground (logs to stderr)
    skyrelay-hn

    # Post the top 5 every 10 minutes
    skyrelay-hn --topn 5 --interval 10m

    # Single pass, e.g. from cron
    skyrelay-hn --once

AUTHENTICATION:
    The auth file holds a Bluesky session as JSON (accessJwt, refreshJwt,
    handle, did), e.g. a saved createSession response. It is rewritten with
    fresh tokens (mode 600) at the start of every cycle.

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes current story)

CONFIGURATION:
    Configuration file: ~/.config/skyrelay/config.toml (or $SKYRELAY_CONFIG)
    Command-line flags override the file.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication or configuration error
")]
struct Cli {
    /// Number of top stories to consider each cycle
    #[arg(long, value_name = "N")]
    topn: Option<usize>,

    /// Time between cycles (e.g. 1m, 90s)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Bluesky PDS base URL
    #[arg(long, value_name = "URL")]
    pds: Option<String>,

    /// Session file, rewritten on every refresh
    #[arg(long, value_name = "FILE")]
    auth: Option<String>,

    /// Seen-store database path
    #[arg(long, value_name = "FILE")]
    db: Option<String>,

    /// What to do when one story fails: isolate (skip it) or abort
    #[arg(long, value_name = "POLICY")]
    on_error: Option<FailurePolicy>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json, or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(topn) = self.topn {
            config.source.top_n = topn;
        }
        if let Some(interval) = self.interval {
            config.source.interval = humantime::format_duration(interval).to_string();
        }
        if let Some(pds) = &self.pds {
            config.bluesky.pds = pds.clone();
        }
        if let Some(auth) = &self.auth {
            config.bluesky.auth_file = auth.clone();
        }
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(policy) = self.on_error {
            config.poll.on_error = policy;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env()
        .with_format(cli.log_format)
        .with_verbose(cli.verbose)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    cli.apply(&mut config);
    config.validate()?;

    let interval = config.poll_interval()?;
    let timeout = config.http_timeout()?;
    let auth_file: PathBuf = config.bluesky.expand_auth_file();

    let publisher = BlueskyClient::from_auth_file(&config.bluesky.pds, auth_file, timeout)?;
    let source = HackerNewsClient::new(&config.source.base_url, timeout)?;
    let db = Database::new(&config.database.path).await?;

    info!("skyrelay-hn starting");
    let posted = db.count().await?;
    if let Some(last) = db.recent(1).await?.first() {
        info!(
            "{} stories posted so far, last was item {} ({})",
            posted, last.external_id, last.uri
        );
    }
    info!(
        "Posting top {} every {} to {} (on error: {})",
        config.source.top_n,
        humantime::format_duration(interval),
        config.bluesky.pds,
        config.poll.on_error
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let mut poller = Poller::new(Box::new(source), Box::new(publisher), db.clone(), config.source.top_n)
        .with_interval(interval)
        .with_policy(config.poll.on_error)
        .with_shutdown(shutdown);

    if cli.once {
        let report = poller.run_cycle().await?;
        info!(
            "Cycle complete: {} listed, {} skipped, {} published, {} failed",
            report.listed,
            report.skipped,
            report.published.len(),
            report.failed.len()
        );
    } else {
        poller.run().await?;
    }

    info!("skyrelay-hn stopped ({} stories posted in total)", db.count().await?);
    db.close().await;
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
