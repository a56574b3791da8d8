//! Pairs command - show which files will be reconciled together.

use std::path::PathBuf;

use colored::Colorize;
use fidelity::{Fidelity, ReconConfig};

use crate::logging;

pub fn run(config_path: PathBuf, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_stderr(verbose)?;
    let config = ReconConfig::load(&config_path)?;
    let fidelity = Fidelity::new(config)?;
    let pairing = fidelity.pair_files()?;

    println!(
        "{} {}",
        pairing.pairs.len().to_string().white().bold(),
        "file pair(s)".cyan().bold()
    );
    for pair in &pairing.pairs {
        println!("  {:30} {}", pair.name.white(), pair.label().dimmed());
    }

    if !pairing.legacy_only.is_empty() {
        println!();
        println!(
            "{}",
            format!("Lost files (only in {}):", fidelity.config().legacy_name)
                .red()
                .bold()
        );
        for path in &pairing.legacy_only {
            println!("  {}", path.display());
        }
    }
    if !pairing.new_only.is_empty() {
        println!();
        println!(
            "{}",
            format!("Extra files (only in {}):", fidelity.config().new_name)
                .yellow()
                .bold()
        );
        for path in &pairing.new_only {
            println!("  {}", path.display());
        }
    }

    if pairing.is_balanced() {
        println!();
        println!("{}", "Every file has a counterpart.".green());
    }

    Ok(())
}
