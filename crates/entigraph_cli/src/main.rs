//! EntiGraph CLI
//!
//! Command-line tools for EntiGraph log files.
//!
//! # Commands
//!
//! - `inspect` - Display log statistics and collections
//! - `verify` - Verify log integrity and graph consistency
//! - `compact` - Rewrite the log as a single checkpoint
//! - `dump-log` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EntiGraph command-line log tools.
#[derive(Parser)]
#[command(name = "entigraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log file
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
    /// Display log statistics and collections
    Inspect {
        /// Show per-collection details
        #[arg(short, long)]
        collections: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Rewrite the log as a single checkpoint
    Compact {
        /// Collect unreachable objects first
        #[arg(short, long)]
        gc: bool,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this record
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        Commands::Inspect {
            collections,
            format,
        } => {
            let path = cli.path.ok_or("Log path required for inspect")?;
            commands::inspect::run(&path, collections, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { gc, dry_run } => {
            let path = cli.path.ok_or("Log path required for compact")?;
            commands::compact::run(&path, gc, dry_run)?;
        }
        Commands::DumpLog {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Log path required for dump-log")?;
            commands::dump_log::run(&path, limit, offset, &format)?;
        }
        Commands::Version => {
            println!("EntiGraph CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("EntiGraph Core v{}", entigraph_core::VERSION);
        }
    }

    Ok(())
}
