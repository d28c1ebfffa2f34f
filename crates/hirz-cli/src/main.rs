//! hirz - Incremental backups of personal folders
//!
//! Usage:
//!   hirz backup            Back up new and modified files
//!   hirz restore --latest  Restore without overwriting anything
//!   hirz list              Show archives
//!   hirz --help            Show help

use anyhow::Result;
use clap::Parser;

use hirz_core::config::Settings;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let paths = cli::resolve_paths(args.home.as_deref())?;
    paths.ensure_dirs()?;

    let settings = Settings::load(&paths.settings_file());

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&settings.log_level);
    if let Err(e) = logging::init(log_level, args.log_level.is_some(), &paths.log_dir()) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    tracing::info!(
        "Starting hirz v{} (home: {})",
        env!("CARGO_PKG_VERSION"),
        paths.home.display()
    );

    let code = cli::run(args.command, &paths, settings).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
