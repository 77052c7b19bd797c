//! # Headline Archiver CLI (`harc`)
//!
//! The `harc` binary runs the crawl-and-archive daemon and answers read-only
//! queries against the archive it builds.
//!
//! ## Usage
//!
//! ```bash
//! harc --config ./config/harc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harc init` | Create the database and content directory |
//! | `harc run` | Poll the listing until SIGINT/SIGTERM (`--once` for one cycle) |
//! | `harc sweep` | Apply the retention window now |
//! | `harc list` | Headlines in a time window, as JSON or one line each |
//! | `harc stats` | Counts per status and domain, files on disk |
//! | `harc export` | Dump records (titles or full content) as JSON |
//! | `harc sources` | Show the listing, strategies, feeds and rate limits |
//!
//! ## Examples
//!
//! ```bash
//! # Run the daemon with a 10 minute interval, keeping 30 days
//! harc run --interval 600 --retention-days 30
//!
//! # Titles from the last 24 hours
//! harc list --hours 24 --titles-only
//!
//! # Full articles since the morning, for a summarizer
//! harc export --since "2024-10-18 06:00" --fetched-only -o digest.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use headline_archiver::archive::Archiver;
use headline_archiver::config::{self, Config, ConfigOverrides, DEFAULT_CONFIG_PATH};
use headline_archiver::content::ensure_content_dir;
use headline_archiver::export::{self, ExportOptions};
use headline_archiver::logging::{init_logging, LogFormat};
use headline_archiver::query::{self, ListOptions};
use headline_archiver::shutdown::ShutdownSignal;
use headline_archiver::store::{SqliteStore, Store};
use headline_archiver::{migrate, retention, sources, stats};

/// Headline Archiver CLI: polls a news listing, archives full articles as
/// Markdown and indexes them in SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harc",
    about = "Headline Archiver: a polling crawl-and-archive daemon for financial news",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harc.toml`; if that file does not exist the
    /// built-in defaults are used. An explicitly given file must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides `db.path`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for article files (overrides `storage.content_dir`).
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,

    /// Poll interval in seconds (overrides `crawl.interval_secs`).
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Retention window in days, 0 keeps everything (overrides `crawl.retention_days`).
    #[arg(long, global = true)]
    retention_days: Option<u32>,

    /// IANA timezone of the listing timestamps (overrides `crawl.timezone`).
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Auto)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and content directory.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Run the archive loop.
    ///
    /// Polls the listing every `crawl.interval_secs`, archives new headlines
    /// and sweeps expired ones. Stops cleanly on SIGINT or SIGTERM.
    Run {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },

    /// Delete records (and their files) older than the retention window.
    Sweep,

    /// List archived headlines in a time window.
    List {
        /// Window size in hours, counting back from now.
        #[arg(long)]
        hours: Option<i64>,

        /// Start of the window (RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`).
        #[arg(long)]
        since: Option<String>,

        /// Only records whose article was archived.
        #[arg(long)]
        fetched_only: bool,

        /// One line per headline instead of JSON.
        #[arg(long, conflicts_with = "with_content")]
        titles_only: bool,

        /// Inline each record's article text.
        #[arg(long)]
        with_content: bool,

        /// Maximum number of records.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show archive statistics.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Export records as JSON.
    Export {
        /// Only records published in the last N hours.
        #[arg(long)]
        hours: Option<i64>,

        /// Only records published at or after this time.
        #[arg(long)]
        since: Option<String>,

        /// Titles and links only, no article text.
        #[arg(long)]
        titles_only: bool,

        /// Only records whose article was archived.
        #[arg(long)]
        fetched_only: bool,

        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the configured listing, strategies, feeds and rate limits.
    Sources,
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let overrides = ConfigOverrides {
        db_path: cli.db.clone(),
        content_dir: cli.content_dir.clone(),
        interval_secs: cli.interval,
        retention_days: cli.retention_days,
        timezone: cli.timezone.clone(),
    };
    config::load_config(&path, required, overrides).map_err(|err| {
        tracing::error!(kind = err.kind(), error = %err, "invalid configuration");
        err.into()
    })
}

/// Cancel `signal` on the first SIGINT or SIGTERM.
fn spawn_shutdown_listener(signal: ShutdownSignal) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        tracing::info!("shutdown signal received");
        signal.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let cfg = load(&cli)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            ensure_content_dir(&cfg.storage.content_dir)
                .with_context(|| format!("content directory {}", cfg.storage.content_dir.display()))?;
            println!("Database initialized successfully.");
        }
        Commands::Run { once } => {
            let cancel = ShutdownSignal::new();
            spawn_shutdown_listener(cancel.clone());
            let mut archiver = Archiver::from_config(cfg, cancel).await.map_err(|err| {
                tracing::error!(kind = err.kind(), error = %err, "failed to start archiver");
                err
            })?;
            archiver.run(once).await;
        }
        Commands::Sweep => {
            let store = SqliteStore::open(&cfg).await?;
            let report = retention::sweep(
                &store,
                &cfg.storage.content_dir,
                cfg.crawl.retention_days,
                Utc::now(),
            )
            .await?;
            store.close().await;
            if cfg.crawl.retention_days == 0 {
                println!("Retention disabled (retention_days = 0); nothing removed.");
            } else {
                println!(
                    "Removed {} records, {} content files, {} orphaned files.",
                    report.removed, report.files_removed, report.orphans_removed
                );
            }
        }
        Commands::List {
            hours,
            since,
            fetched_only,
            titles_only,
            with_content,
            limit,
        } => {
            let opts = ListOptions {
                hours,
                since,
                fetched_only,
                titles_only,
                with_content,
                limit,
            };
            query::run_list(&cfg, &opts).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Export {
            hours,
            since,
            titles_only,
            fetched_only,
            output,
        } => {
            let opts = ExportOptions {
                hours,
                since,
                titles_only,
                fetched_only,
            };
            export::run_export(&cfg, &opts, output.as_deref()).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
    }

    Ok(())
}
