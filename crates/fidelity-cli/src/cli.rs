//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fidelity: reconcile legacy and new system exports record by record
#[derive(Parser)]
#[command(name = "fidelity")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile every file pair and write reports to a new run directory
    Run {
        /// Path to the reconciliation config (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Print the outcome as JSON instead of the live progress frame
        #[arg(long)]
        json: bool,

        /// Seconds between progress frames
        #[arg(long, value_name = "SECS", default_value = "1")]
        refresh: u64,
    },

    /// Discover key fields from a legacy sample
    Keys {
        /// Path to the reconciliation config (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Write the keys to the configured keys file
        #[arg(long)]
        save: bool,
    },

    /// Show how legacy and new files pair up
    Pairs {
        /// Path to the reconciliation config (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}
