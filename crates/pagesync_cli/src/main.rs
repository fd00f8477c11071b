//! PageSync CLI
//!
//! Command-line tools for exercising sync cursors offline.
//!
//! # Commands
//!
//! - `replay` - Run a cursor against a JSON fixture and print the entities
//! - `plan` - Print the windows and filters a run would query

mod commands;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pagesync_engine::{FilterScope, SyncMode, SyncRange, SyncSettings, ALL_WEBSITES};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PageSync command-line tools.
#[derive(Parser)]
#[command(name = "pagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cursor against a fixture and print the entities it yields
    Replay {
        /// Path to the fixture JSON file
        fixture: PathBuf,

        /// Entity kind to import
        #[arg(short, long)]
        kind: String,

        /// Field holding the entity id
        #[arg(long, default_value = "entity_id")]
        id_field: String,

        /// Scope clause of discovery queries
        #[arg(long, value_enum, default_value = "unscoped")]
        scope: ScopeArg,

        /// Import exactly these ids (comma separated) instead of discovering
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Bulk-load fixed ids up front
        #[arg(long)]
        bulk: bool,

        /// Merge store and website details into entities
        #[arg(long)]
        with_dependencies: bool,

        /// Stop after this many entities
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Print the windows and filters a run would query
    Plan {
        /// Server clock to plan up to (RFC 3339)
        #[arg(long)]
        until: DateTime<Utc>,

        /// Maximum number of windows to print
        #[arg(short, long, default_value = "100")]
        limit: usize,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Show version information
    Version,
}

/// Cursor settings shared by all commands.
#[derive(Args)]
struct SettingsArgs {
    /// Start sync date (RFC 3339)
    #[arg(short, long)]
    start: Option<DateTime<Utc>>,

    /// Import mode
    #[arg(short, long, value_enum, default_value = "update")]
    mode: ModeArg,

    /// Website id; -1 imports all websites
    #[arg(short, long, default_value_t = ALL_WEBSITES, allow_hyphen_values = true)]
    website: i64,

    /// Window size in months
    #[arg(long, default_value = "1")]
    range_months: u32,

    /// Earliest date an initial window may reach (RFC 3339)
    #[arg(long)]
    min_date: Option<DateTime<Utc>>,
}

impl SettingsArgs {
    fn to_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings {
            website_id: self.website,
            start_sync_date: self.start,
            ..SyncSettings::default()
        }
        .with_mode(self.mode.into())
        .with_sync_range(SyncRange::months(self.range_months));
        settings.min_sync_date = self.min_date;
        settings
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Initial,
    Update,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Initial => SyncMode::Initial,
            ModeArg::Update => SyncMode::Update,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Unscoped,
    Website,
    Store,
}

impl From<ScopeArg> for FilterScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Unscoped => FilterScope::Unscoped,
            ScopeArg::Website => FilterScope::Website,
            ScopeArg::Store => FilterScope::Store,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            fixture,
            kind,
            id_field,
            scope,
            ids,
            bulk,
            with_dependencies,
            limit,
            format,
            settings,
        } => {
            let options = commands::replay::ReplayOptions {
                kind,
                id_field,
                scope: scope.into(),
                fixed_ids: ids,
                bulk,
                with_dependencies,
                limit,
            };
            commands::replay::run(&fixture, settings.to_settings(), &options, &format)?;
        }
        Commands::Plan {
            until,
            limit,
            settings,
        } => {
            commands::plan::run(&settings.to_settings(), until, limit)?;
        }
        Commands::Version => {
            println!("PageSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
