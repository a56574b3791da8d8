//! Fidelity CLI - legacy/new migration reconciliation.

mod cli;
mod commands;
mod logging;
mod progress;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            json,
            refresh,
        } => commands::run::run(config, json, refresh, cli.verbose),

        Commands::Keys { config, save } => {
            commands::keys::run(config, save, cli.verbose).map(|()| 0)
        }

        Commands::Pairs { config } => commands::pairs::run(config, cli.verbose).map(|()| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
