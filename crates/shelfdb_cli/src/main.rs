//! shelfdb CLI
//!
//! Command-line tools for inspecting and maintaining shelfdb journals.
//!
//! # Commands
//!
//! - `inspect` - Display journal statistics and the schema of every database
//! - `dump` - Print the records of an object store or index
//! - `compact` - Rewrite the journal without stale frames

mod commands;
mod error;
mod render;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// shelfdb command-line journal tools.
#[derive(Parser)]
#[command(name = "shelfdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display journal statistics and database schemas
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of an object store
    Dump {
        /// Database name
        database: String,

        /// Object store name
        store: String,

        /// Dump this index of the store instead of its records
        #[arg(short, long)]
        index: Option<String>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the journal without stale frames
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump {
            database,
            store,
            index,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Journal path required for dump")?;
            let target = commands::dump::Target {
                database: &database,
                store: &store,
                index: index.as_deref(),
            };
            commands::dump::run(&path, &target, limit, &format)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Journal path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("shelfdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Journal format v{}", shelfdb_storage::JOURNAL_VERSION);
            println!("Max database version {}", shelfdb_core::MAX_VERSION);
        }
    }

    Ok(())
}
