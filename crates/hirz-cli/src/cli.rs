//! Command-line interface
//!
//! Usage:
//!   hirz backup [--folder DIR]... [--exclude PATTERN]... [--keep N]
//!   hirz restore <ARCHIVE> | --latest
//!   hirz list [--json]
//!   hirz delete <ARCHIVE>...
//!   hirz rotate [--keep N]
//!   hirz history [--limit N]
//!   hirz config <action>

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{ArgAction, Parser, Subcommand};

use hirz_core::activity::{ActivityLog, ActivityType};
use hirz_core::backup::{format_size, BackupRepository};
use hirz_core::config::{AppPaths, Settings};
use hirz_core::task::{
    spawn_backup, spawn_restore, BackupJob, RestoreJob, TaskEvent, TaskHandle, TaskOutcome,
};
use hirz_core::BackupOrchestrator;

/// Exit status after the user cancelled with Ctrl-C
pub const EXIT_CANCELLED: i32 = 130;
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "hirz", author, version, about = "Incremental backups of your personal folders", long_about = None)]
pub struct Args {
    /// Treat this directory as home (settings and archives live under it)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Back up files that are new or changed since the last backup
    Backup {
        /// Folder to back up (repeatable); defaults to the configured folders
        #[arg(long = "folder", value_name = "DIR")]
        folders: Vec<PathBuf>,

        /// Exclusion pattern (repeatable); replaces the configured patterns
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclusions: Vec<String>,

        /// Number of archives to keep afterwards
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },

    /// Restore an archive into home, skipping files that already exist
    Restore {
        /// Archive path or name inside the backup directory
        #[arg(required_unless_present = "latest", conflicts_with = "latest")]
        archive: Option<PathBuf>,

        /// Restore the most recent archive
        #[arg(long)]
        latest: bool,
    },

    /// List archives, newest first
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete archives
    Delete {
        #[arg(required = true, value_name = "ARCHIVE")]
        archives: Vec<PathBuf>,
    },

    /// Delete all but the newest archives
    Rotate {
        /// Number of archives to keep; defaults to the configured retention
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },

    /// Show recent activity
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Print the current settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Back up an extra folder
    AddFolder { path: PathBuf },
    RemoveFolder { path: PathBuf },
    /// Include a folder again, default or custom
    EnableFolder { path: PathBuf },
    /// Leave a folder out of backups without forgetting it
    DisableFolder { path: PathBuf },
    /// Add a glob pattern such as `*.iso` or `node_modules`
    AddExclusion { pattern: String },
    RemoveExclusion { pattern: String },
    /// Number of archives to keep (1-100)
    SetRetention { count: usize },
    /// Skip files and folders whose name starts with a dot
    IgnoreHidden {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Restore default settings
    Reset,
}

/// Run a command, returning the process exit status
pub async fn run(command: Command, paths: &AppPaths, settings: Settings) -> anyhow::Result<i32> {
    match command {
        Command::Backup {
            folders,
            exclusions,
            keep,
        } => run_backup(paths, &settings, folders, exclusions, keep).await,
        Command::Restore { archive, latest } => {
            run_restore(paths, &settings, archive, latest).await
        }
        Command::List { json } => run_list(paths, json),
        Command::Delete { archives } => run_delete(paths, &archives),
        Command::Rotate { keep } => run_rotate(paths, &settings, keep),
        Command::History { limit } => run_history(paths, limit),
        Command::Config { action } => run_config(paths, settings, action),
    }
}

fn orchestrator(paths: &AppPaths, settings: &Settings) -> BackupOrchestrator {
    BackupOrchestrator::for_paths(paths).with_compression_level(settings.compression_level)
}

/// Relative paths are resolved against the current directory
fn absolutize(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("cannot read current directory")?
            .join(path))
    }
}

/// Application paths for `--home`, or the detected home directory.
///
/// A relative `--home` is resolved against the current directory, so it
/// stays a prefix of folders given with `--folder`.
pub fn resolve_paths(home: Option<&Path>) -> anyhow::Result<AppPaths> {
    match home {
        Some(home) => Ok(AppPaths::with_home(absolutize(home)?)),
        None => Ok(AppPaths::detect()?),
    }
}

/// An archive given on the command line: an existing path, or a name in the backup directory
fn resolve_archive(paths: &AppPaths, archive: &Path) -> PathBuf {
    if archive.exists() {
        archive.to_path_buf()
    } else {
        paths.backup_dir.join(archive)
    }
}

/// Exclusions for a run: the given patterns, or the configured ones
fn backup_exclusions(settings: &Settings, overrides: Vec<String>) -> Vec<String> {
    if overrides.is_empty() {
        return settings.effective_exclusions();
    }
    let scoped = Settings {
        exclusions: overrides,
        ..settings.clone()
    };
    scoped.effective_exclusions()
}

fn record_activity(paths: &AppPaths, kind: ActivityType, description: &str, details: Option<String>) {
    let mut log = ActivityLog::load(&paths.activity_file());
    match details {
        Some(details) => log.log_with_details(kind, description, details),
        None => log.log(kind, description),
    }
    if let Err(e) = log.save() {
        tracing::warn!("Failed to save activity log: {}", e);
    }
}

async fn run_backup(
    paths: &AppPaths,
    settings: &Settings,
    folders: Vec<PathBuf>,
    exclusions: Vec<String>,
    keep: Option<usize>,
) -> anyhow::Result<i32> {
    let folders = if folders.is_empty() {
        settings.selected_folders(paths)
    } else {
        folders
            .iter()
            .map(|f| absolutize(f))
            .collect::<anyhow::Result<Vec<_>>>()?
    };
    if folders.is_empty() {
        anyhow::bail!("No folders selected for backup. Add one with `hirz config add-folder <DIR>`.");
    }

    let retention = match keep {
        Some(n) => {
            let mut scoped = settings.clone();
            scoped.set_retention(n)?;
            scoped.retention
        }
        None => settings.retention,
    };

    let orchestrator = orchestrator(paths, settings);
    let destination = orchestrator.repository().new_archive_path()?;
    let job = BackupJob {
        folders,
        destination,
        exclusions: backup_exclusions(settings, exclusions),
        retention: Some(retention),
    };

    eprintln!("Backing up {} folders...", job.folders.len());
    let outcome = wait_for_task(spawn_backup(orchestrator, job)).await?;
    Ok(report_outcome(paths, ActivityType::Backup, &outcome))
}

async fn run_restore(
    paths: &AppPaths,
    settings: &Settings,
    archive: Option<PathBuf>,
    latest: bool,
) -> anyhow::Result<i32> {
    let repository = BackupRepository::new(&paths.backup_dir);
    let archive = match archive {
        Some(archive) if !latest => resolve_archive(paths, &archive),
        _ => repository
            .latest()
            .ok_or_else(|| anyhow::anyhow!("No backups found in {}", paths.backup_dir.display()))?,
    };
    if !archive.is_file() {
        anyhow::bail!("Backup file not found: {}", archive.display());
    }

    eprintln!("Restoring {} into {}...", archive.display(), paths.home.display());
    let job = RestoreJob { archive };
    let outcome = wait_for_task(spawn_restore(orchestrator(paths, settings), job)).await?;
    Ok(report_outcome(paths, ActivityType::Restore, &outcome))
}

/// Drain progress events until the task finishes; Ctrl-C requests cancellation
async fn wait_for_task(handle: TaskHandle) -> anyhow::Result<TaskOutcome> {
    let flag = handle.cancel_flag();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling after the current file");
            eprintln!("\nCancelling after the current file...");
            flag.store(false, Ordering::SeqCst);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let mut outcome = None;
        for event in handle.events().iter() {
            match event {
                TaskEvent::Progress(progress) => {
                    eprint!("\r{:<72}", progress.to_string());
                    let _ = std::io::stderr().flush();
                }
                TaskEvent::Finished(result) => outcome = Some(result),
            }
        }
        handle.join();
        outcome
    })
    .await?;

    ctrl_c.abort();
    eprintln!();

    outcome.ok_or_else(|| anyhow::anyhow!("background task ended without a result"))
}

/// Print the outcome, record it, and pick the exit status
fn report_outcome(paths: &AppPaths, kind: ActivityType, outcome: &TaskOutcome) -> i32 {
    match outcome {
        TaskOutcome::Completed { message } => {
            println!("{}", message);
            record_activity(paths, kind, message, None);
            0
        }
        TaskOutcome::Cancelled { message } => {
            eprintln!("{}", message);
            record_activity(paths, ActivityType::Cancelled, message, None);
            EXIT_CANCELLED
        }
        TaskOutcome::Failed {
            message,
            category,
            severity,
        } => {
            eprintln!("Error: {}", message);
            record_activity(
                paths,
                ActivityType::Error,
                message,
                Some(format!("category={} severity={}", category, severity)),
            );
            EXIT_FAILURE
        }
    }
}

fn run_list(paths: &AppPaths, json: bool) -> anyhow::Result<i32> {
    let repository = BackupRepository::new(&paths.backup_dir);
    let archives = repository.list();

    if json {
        let items: Vec<_> = archives
            .iter()
            .map(|path| match repository.describe(path) {
                Ok(info) => serde_json::json!({
                    "name": info.name(),
                    "path": info.path,
                    "size_bytes": info.size_bytes,
                    "modified": DateTime::<Local>::from(info.modified).to_rfc3339(),
                    "file_count": info.file_count,
                    "has_manifest": info.has_manifest,
                }),
                Err(e) => serde_json::json!({
                    "path": path,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(0);
    }

    if archives.is_empty() {
        println!("No backups in {}", paths.backup_dir.display());
        return Ok(0);
    }

    println!("Backups in {}:", paths.backup_dir.display());
    for (i, path) in archives.iter().enumerate() {
        match repository.describe(path) {
            Ok(info) => println!(
                "  {:>2}. {:<32} {:>10}  {:>6} files  {}",
                i + 1,
                info.name(),
                info.size_display(),
                info.file_count,
                info.age_display()
            ),
            Err(e) => println!("  {:>2}. {:<32} unreadable: {}", i + 1, path.display(), e),
        }
    }
    Ok(0)
}

fn run_delete(paths: &AppPaths, archives: &[PathBuf]) -> anyhow::Result<i32> {
    let repository = BackupRepository::new(&paths.backup_dir);
    let targets: Vec<PathBuf> = archives
        .iter()
        .map(|a| resolve_archive(paths, a))
        .collect();

    let deleted = repository.delete(&targets);
    let message = format!("Deleted {} of {} backups.", deleted, targets.len());
    println!("{}", message);
    if deleted > 0 {
        record_activity(paths, ActivityType::Delete, &message, None);
    }

    Ok(if deleted == targets.len() { 0 } else { EXIT_FAILURE })
}

fn run_rotate(paths: &AppPaths, settings: &Settings, keep: Option<usize>) -> anyhow::Result<i32> {
    let keep = match keep {
        Some(n) => {
            let mut scoped = settings.clone();
            scoped.set_retention(n)?;
            n
        }
        None => settings.retention,
    };

    let deleted = BackupRepository::new(&paths.backup_dir).apply_rotation(keep);
    let message = format!("Removed {} old backups, keeping the newest {}.", deleted, keep);
    println!("{}", message);
    if deleted > 0 {
        record_activity(paths, ActivityType::Rotation, &message, None);
    }
    Ok(0)
}

fn run_history(paths: &AppPaths, limit: usize) -> anyhow::Result<i32> {
    let log = ActivityLog::load(&paths.activity_file());
    if log.is_empty() {
        println!("No activity recorded yet.");
        return Ok(0);
    }

    for entry in log.recent(limit) {
        println!(
            "{}  [{:<9}] {}",
            entry.formatted_datetime(),
            entry.activity_type.display_name(),
            entry.description
        );
        if let Some(ref details) = entry.details {
            println!("{:>33}{}", "", details);
        }
    }
    Ok(0)
}

fn run_config(paths: &AppPaths, mut settings: Settings, action: ConfigAction) -> anyhow::Result<i32> {
    let message = match action {
        ConfigAction::Show { json } => {
            print_settings(paths, &settings, json)?;
            return Ok(0);
        }
        ConfigAction::AddFolder { path } => {
            let path = absolutize(&path)?;
            settings.add_folder(&path)?;
            format!("Added folder {}", path.display())
        }
        ConfigAction::RemoveFolder { path } => {
            let path = absolutize(&path)?;
            if !settings.remove_folder(&path) {
                anyhow::bail!("{} is not a configured folder", path.display());
            }
            format!("Removed folder {}", path.display())
        }
        ConfigAction::EnableFolder { path } => {
            let path = absolutize(&path)?;
            settings.set_folder_enabled(&path, true);
            format!("Enabled folder {}", path.display())
        }
        ConfigAction::DisableFolder { path } => {
            let path = absolutize(&path)?;
            settings.set_folder_enabled(&path, false);
            format!("Disabled folder {}", path.display())
        }
        ConfigAction::AddExclusion { pattern } => {
            if !settings.add_exclusion(&pattern) {
                anyhow::bail!("Pattern '{}' is empty or already present", pattern);
            }
            format!("Added exclusion '{}'", pattern.trim())
        }
        ConfigAction::RemoveExclusion { pattern } => {
            if !settings.remove_exclusion(&pattern) {
                anyhow::bail!("Pattern '{}' is not in the exclusion list", pattern);
            }
            format!("Removed exclusion '{}'", pattern)
        }
        ConfigAction::SetRetention { count } => {
            settings.set_retention(count)?;
            format!("Keeping the newest {} backups", count)
        }
        ConfigAction::IgnoreHidden { enabled } => {
            settings.ignore_hidden_files = enabled;
            if enabled {
                "Hidden files will be skipped".to_string()
            } else {
                "Hidden files will be backed up".to_string()
            }
        }
        ConfigAction::Reset => {
            settings.reset();
            "Settings reset to defaults".to_string()
        }
    };

    settings.save(&paths.settings_file())?;
    tracing::info!("{}", message);
    println!("{}", message);
    Ok(0)
}

fn print_settings(paths: &AppPaths, settings: &Settings, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    println!("Settings file:  {}", paths.settings_file().display());
    println!("Backups:        {}", paths.backup_dir.display());
    println!("Retention:      {}", settings.retention);
    println!("Compression:    {}", settings.compression_level);
    println!("Ignore hidden:  {}", settings.ignore_hidden_files);
    println!("Log level:      {}", settings.log_level);
    println!();
    println!("Folders to back up:");
    let selected = settings.selected_folders(paths);
    if selected.is_empty() {
        println!("  (none)");
    }
    for folder in &selected {
        println!("  {}", folder.display());
    }
    let disabled: Vec<_> = settings.folders.iter().filter(|f| !f.enabled).collect();
    if !disabled.is_empty() {
        println!("Disabled:");
        for folder in disabled {
            println!("  {}", folder.path.display());
        }
    }
    println!();
    println!("Exclusions ({}):", settings.exclusions.len());
    for pattern in &settings.exclusions {
        println!("  {}", pattern);
    }
    let total: u64 = BackupRepository::new(&paths.backup_dir)
        .list()
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    println!();
    println!("Backup storage used: {}", format_size(total));
    Ok(())
}
