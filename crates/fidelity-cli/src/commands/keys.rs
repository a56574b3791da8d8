//! Keys command - discover (and optionally save) key fields.

use std::path::PathBuf;

use colored::Colorize;
use fidelity::inference::save_keys;
use fidelity::{Fidelity, ReconConfig};

use crate::logging;

pub fn run(config_path: PathBuf, save: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_stderr(verbose)?;
    let config = ReconConfig::load(&config_path)?;
    let fidelity = Fidelity::new(config)?;

    let legacy = fidelity.legacy_files()?;
    println!(
        "{} {} {} file(s)",
        "Sampling".cyan().bold(),
        legacy.len().to_string().white().bold(),
        fidelity.config().legacy_name
    );

    let keys = fidelity.discover_keys(&legacy)?;
    let names: Vec<String> = keys
        .iter()
        .map(|&i| fidelity.config().field_name(i))
        .collect();
    println!(
        "Key fields: {} ({})",
        format!("{:?}", keys).green().bold(),
        names.join(", ")
    );

    if save {
        let path = &fidelity.config().keys.keys_file;
        save_keys(path, &keys)?;
        println!("Saved to {}", path.display().to_string().cyan());
    }

    Ok(())
}
