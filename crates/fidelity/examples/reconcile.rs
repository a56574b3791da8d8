//! Example: Reconcile a legacy export against a new-system export.
//!
//! Usage:
//!   cargo run --example reconcile -- <legacy_file> <new_file> <number_of_fields> [key_field...]
//!
//! Example:
//!   cargo run --example reconcile -- old_cdr.txt new_cdr.txt 5 0 2

use std::env;
use std::path::PathBuf;

use fidelity::{Fidelity, KeyStrategy, MemorySink, ReconConfig, ReportCategory, RunStatus};

fn main() -> fidelity::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: cargo run --example reconcile -- <legacy_file> <new_file> <number_of_fields> [key_field...]");
        std::process::exit(1);
    }

    let legacy = PathBuf::from(&args[1]);
    let new = PathBuf::from(&args[2]);
    let number_of_fields: usize = args[3].parse().unwrap_or_else(|_| {
        eprintln!("Error: number_of_fields must be a positive integer");
        std::process::exit(1);
    });
    let key_fields: Vec<usize> = args[4..].iter().filter_map(|a| a.parse().ok()).collect();

    // Single files pair with each other as long as both names reduce to the
    // same canonical name, so use a pattern that keeps everything after the
    // first underscore.
    let config = ReconConfig::from_toml(&format!(
        r#"
        [storage]
        legacy = {legacy:?}
        new = {new:?}
        rename_pattern = "^[^_]*_(.+)"

        [records]
        number_of_fields = {number_of_fields}
        "#
    ))?;
    let fidelity = Fidelity::new(config)?;

    let separator = "=".repeat(80);
    println!("{}", separator);
    println!("Fidelity reconciliation: {} vs {}", legacy.display(), new.display());
    println!("{}", separator);
    println!();

    let pairing = fidelity.pair_files()?;
    let keys = if key_fields.is_empty() {
        KeyStrategy::fields(fidelity.discover_keys(&[legacy.clone()])?)
    } else {
        KeyStrategy::fields(key_fields)
    };
    println!("## Keys: {}", keys);

    let sink = MemorySink::new();
    let outcome = fidelity.reconciler(keys, &sink).run(&pairing)?;
    let run = outcome.snapshot.run;

    println!();
    println!("## Counts");
    println!("  Legacy records:  {}", run.legacy_records);
    println!("  New records:     {}", run.new_records);
    println!("  Matched:         {}", run.matched);
    println!("  Lost:            {}", run.lost);
    println!("  Extra:           {}", run.extra);
    println!("  Identical:       {}", run.identical_records);
    println!("  Broken:          {} ({} fields)", run.broken_records, run.broken_fields);
    println!("  Defective:       {}", run.defective_records);

    if let Some(summary) = sink.payloads(ReportCategory::PatternSummary).first() {
        println!();
        println!("## Top diff patterns");
        print!("{}", summary);
    }

    if outcome.status == RunStatus::Interrupted {
        println!("\n(interrupted)");
    }
    Ok(())
}
