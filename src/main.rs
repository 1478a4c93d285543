//! Clanscore - activity-quality reports for clan rosters
//!
//! A CLI tool that scores clan members' recent play by pulling
//! paginated data from the stats API and weighing recency against
//! clanmate participation.
//!
//! Exit codes:
//!   0 - Success envelope produced
//!   1 - Runtime error (config, client setup, IO)
//!   2 - The report failed; the envelope carries the error code

mod api;
mod cache;
mod clan;
mod cli;
mod config;
mod models;
mod ordering;
mod scoring;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Command};
use config::Config;
use indicatif::ProgressBar;
use models::Outcome;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use api::ApiClient;
use cache::{DiskCache, MemoryCache, QueryCache};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Clanscore v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the report
    match run_report(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .clanscore.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".clanscore.toml");

    if path.exists() {
        eprintln!("⚠️  .clanscore.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .clanscore.toml")?;

    println!("✅ Created .clanscore.toml with default settings.");
    println!("   Edit it to customize the API endpoint, key, and cache.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the selected report. Returns the exit code (0 or 2).
async fn run_report(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    if config.api.key.is_none() {
        warn!("no API key configured; the upstream will likely reject requests");
    }

    let client = ApiClient::new(&config.api)?;

    let cache: Box<dyn QueryCache> = if config.cache.enabled {
        debug!("using disk cache at {}", config.cache.dir);
        Box::new(DiskCache::new(&config.cache.dir))
    } else {
        debug!("disk cache disabled; using a per-run memory cache");
        Box::new(MemoryCache::new())
    };

    let spinner = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_message("Fetching report...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let now = Utc::now();
    let outcome = match &args.command {
        Command::Clan { identifier } => {
            envelope(clan::clan_info(&client, cache.as_ref(), identifier).await)
        }
        Command::Members { clan_ids } => {
            envelope(clan::clan_members(&client, cache.as_ref(), clan_ids).await)
        }
        Command::Activities { membership_id, ally_ids } => envelope(
            scoring::member_activities(
                &client,
                cache.as_ref(),
                membership_id,
                ally_ids.as_deref().unwrap_or_default(),
                now,
            )
            .await,
        ),
        Command::Details { membership_id, ally_ids, category } => envelope(
            scoring::member_details(
                &client,
                cache.as_ref(),
                membership_id,
                ally_ids.as_deref().unwrap_or_default(),
                category.as_str(),
                now,
            )
            .await,
        ),
        Command::InitConfig => unreachable!("handled before logging init"),
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let rendered =
        serde_json::to_string_pretty(&outcome).context("Failed to serialize result envelope")?;

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(if outcome.success { 0 } else { 2 })
}

/// Fold an operation result into the serializable envelope.
fn envelope<T: serde::Serialize>(result: std::result::Result<T, api::QueryError>) -> Outcome {
    match result {
        Ok(data) => Outcome::ok(data),
        Err(error) => Outcome::from(&error),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .clanscore.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
