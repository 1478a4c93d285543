//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clanscore - activity-quality reports for clan rosters
///
/// Pulls account, history and match data from the stats API, scores
/// each member's recent play on recency and clanmate participation,
/// and prints the JSON result envelope.
///
/// Examples:
///   clanscore clan "The Vanguard"
///   clanscore members 1961495,2035421
///   clanscore activities 4611686018428388500 --ally-ids 4611686018428390000,4611686018428390001
///   clanscore details 4611686018428388500 --ally-ids 4611686018428390000 --category raid
///   clanscore init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// API key sent with every request
    #[arg(long, env = "BUNGIE_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the API base URL
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .clanscore.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Write the JSON envelope here instead of stdout
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Disable the on-disk query cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Directory for the on-disk query cache
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Report to produce.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Clan metadata and administrator roster
    Clan {
        /// Clan id or clan name
        identifier: String,
    },
    /// Member rosters for one or more clans
    Members {
        /// Clan ids (comma-separated)
        #[arg(value_delimiter = ',')]
        clan_ids: Vec<String>,
    },
    /// Aggregate activity-quality scores for one member
    Activities {
        /// The member's membership id
        membership_id: String,

        /// Clanmate membership ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ally_ids: Option<Vec<String>>,
    },
    /// Per-activity breakdown of one clan-aware category
    Details {
        /// The member's membership id
        membership_id: String,

        /// Clanmate membership ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ally_ids: Option<Vec<String>>,

        /// Category to break down
        #[arg(long)]
        category: DetailCategory,
    },
    /// Generate a default .clanscore.toml configuration file
    InitConfig,
}

/// Clan-aware categories available in the detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DetailCategory {
    Clan,
    Raid,
    Crucible,
    Osiris,
}

impl DetailCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailCategory::Clan => "clan",
            DetailCategory::Raid => "raid",
            DetailCategory::Crucible => "crucible",
            DetailCategory::Osiris => "osiris",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref base_url) = self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
