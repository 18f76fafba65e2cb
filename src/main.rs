//! # Intake Scanner CLI (`intake`)
//!
//! Runs scan passes over the work-item store, keeps them running on an
//! interval, serves the control surface, and refreshes the topic feed.
//!
//! ## Usage
//!
//! ```bash
//! intake --config ./config/intake.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `intake run` | One pass over the work-item store |
//! | `intake daemon` | Pass every `interval` seconds until interrupted |
//! | `intake serve` | Control-surface HTTP server (optionally with the daemon) |
//! | `intake topics` | List the topic catalog |
//! | `intake intel scan` | Refresh the topic feed |
//!
//! ## Examples
//!
//! ```bash
//! # Analyze everything that is pending, with per-item progress
//! intake run --config ./config/intake.toml
//!
//! # Poll every two minutes
//! intake daemon --interval 120
//!
//! # Dashboard API plus polling loop in one process
//! intake serve --with-daemon
//!
//! # Show which topics would be scanned
//! intake intel scan --topic 0 4 --dry-run
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use intake_scanner::config::{self, Config};
use intake_scanner::daemon::Daemon;
use intake_scanner::feed::FeedStore;
use intake_scanner::gate::ScanGate;
use intake_scanner::intel::IntelScanner;
use intake_scanner::logging;
use intake_scanner::orchestrator::ScanOrchestrator;
use intake_scanner::progress::ProgressMode;
use intake_scanner::search::SonarClient;
use intake_scanner::server;
use intake_scanner::topics;

/// Intake Scanner: background analysis for captured content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/intake.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "intake",
    about = "Scan orchestration for queued work items and periodic topic intelligence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/intake.toml")]
    config: PathBuf,

    /// Debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass over the work-item store.
    ///
    /// Fetches the collection, analyzes every item without an analysis and
    /// writes the collection back. Prints one line per item and a summary.
    Run {
        /// Progress output: `human`, `json`, or `off` (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Run passes on an interval until Ctrl-C or SIGTERM.
    ///
    /// A running pass is never interrupted; shutdown waits for it.
    Daemon {
        /// Seconds between passes (overrides `[daemon].interval_secs`).
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Start the control-surface HTTP server.
    Serve {
        /// Also run the work-item daemon loop in this process.
        #[arg(long)]
        with_daemon: bool,
    },

    /// List the topic catalog.
    Topics,

    /// Topic feed commands.
    Intel {
        #[command(subcommand)]
        action: IntelAction,
    },
}

#[derive(Subcommand)]
enum IntelAction {
    /// Query the search service for each selected topic and update the feed.
    Scan {
        /// Topic indices to scan (default: all). See `intake topics`.
        #[arg(long = "topic", num_args = 1..)]
        topics: Vec<i64>,

        /// List the selection without calling the service.
        #[arg(long)]
        dry_run: bool,

        /// Progress output: `human`, `json`, or `off` (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that can run on defaults
    match &cli.command {
        Commands::Topics => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            print_topics(&cfg);
            return Ok(());
        }
        Commands::Intel {
            action: IntelAction::Scan {
                topics, dry_run, ..
            },
        } if *dry_run => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let catalog = cfg.intel.topic_catalog();
            let selected = topics::select(catalog.len(), requested(topics));
            println!("Would scan {} of {} topics:", selected.len(), catalog.len());
            for i in selected {
                let t = &catalog[i];
                println!("  [{}] {} {} ({})", i, t.icon, t.label, t.frequency.as_str());
            }
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run { progress } => {
            let mode = ProgressMode::from_flag(progress.as_deref())?;
            let gate = Arc::new(ScanGate::new());
            let orchestrator =
                ScanOrchestrator::from_config(&cfg, gate)?.with_reporter(mode.reporter());
            let report = orchestrator
                .run_pass()
                .await
                .context("another scan holds the gate")?;
            println!("{}", report.summary());
            if let Some(err) = report.store_error {
                bail!("pass did not complete: {}", err);
            }
        }
        Commands::Daemon { interval } => {
            let interval = interval.unwrap_or(cfg.daemon.interval_secs);
            if interval == 0 {
                bail!("--interval must be greater than zero");
            }
            let gate = Arc::new(ScanGate::new());
            let orchestrator = Arc::new(ScanOrchestrator::from_config(&cfg, gate)?);
            let daemon = Daemon::new(orchestrator, Duration::from_secs(interval));
            daemon.stop_flag().stop_on_signal();
            let ticks = daemon.run().await;
            println!("Daemon stopped after {} passes.", ticks);
        }
        Commands::Serve { with_daemon } => {
            server::run_server(&cfg, with_daemon).await?;
        }
        Commands::Intel {
            action:
                IntelAction::Scan {
                    topics, progress, ..
                },
        } => {
            let mode = ProgressMode::from_flag(progress.as_deref())?;
            let client = SonarClient::from_config(&cfg.intel)?;
            let scanner = IntelScanner::new(
                cfg.intel.topic_catalog(),
                Arc::new(client),
                FeedStore::from_config(&cfg.intel),
                Arc::new(ScanGate::new()),
            )
            .with_delay(Duration::from_millis(cfg.intel.delay_ms))
            .with_reporter(mode.reporter());
            let report = scanner
                .scan(requested(&topics))
                .await
                .context("another scan holds the gate")?;
            println!("{}", report.summary());
            println!("Feed: {}", scanner.feed_store().feed_path().display());
            if let Some(err) = report.error {
                bail!("{}", err);
            }
        }
        Commands::Topics => unreachable!(),
    }

    Ok(())
}

/// `--topic` given zero times means every topic.
fn requested(topics: &[i64]) -> Option<&[i64]> {
    if topics.is_empty() {
        None
    } else {
        Some(topics)
    }
}

fn print_topics(cfg: &Config) {
    for (i, t) in cfg.intel.topic_catalog().iter().enumerate() {
        let preview: String = t.query.chars().take(60).collect();
        println!(
            "[{}] {} {:<50} {:<8} {:<12} {}...",
            i,
            t.icon,
            t.label,
            t.frequency.as_str(),
            t.category,
            preview
        );
    }
}
