//! Tracing subscriber setup.
//!
//! `RUST_LOG` always wins; otherwise `--verbose` selects debug output.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "fidelity=debug,info" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to stderr.
pub fn init_stderr(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Log to `path`, keeping the terminal free for the progress frame.
pub fn init_file(path: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)
        .map_err(|e| format!("Cannot create log file {}: {}", path.display(), e))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| e.to_string())?;
    Ok(())
}
