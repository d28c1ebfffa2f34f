//! Logging configuration using tracing.
//!
//! Every event goes to two sinks: a compact stderr layer and a plain-text
//! file under the application log directory.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "hirz.log";

/// Checked before `RUST_LOG`
pub const LOG_ENV_VAR: &str = "HIRZ_LOG";

/// Level shown on the terminal unless asked for more
const QUIET_CONSOLE_LEVEL: &str = "warn";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(log_dir: &Path) -> Option<File> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: cannot create log directory {}: {}", log_dir.display(), e);
        return None;
    }
    let path = log_dir.join(LOG_FILE_NAME);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Initialize logging.
///
/// The file sink records events at `level`. The terminal only shows
/// warnings and errors unless `verbose` is set, so progress output stays
/// readable. If the log file cannot be opened only the terminal sink is
/// installed.
pub fn init(level: &str, verbose: bool, log_dir: &Path) -> anyhow::Result<()> {
    let console_filter = if verbose {
        env_filter(level)
    } else {
        EnvFilter::new(QUIET_CONSOLE_LEVEL)
    };
    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = open_log_file(log_dir).map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
            .with_filter(env_filter(level))
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
