//! # hirz-core
//!
//! Core library for incremental backups of personal folders and
//! merge-style restores that never overwrite existing files.
//!
//! This crate provides the foundational functionality for:
//! - Scanning folders with glob exclusion rules
//! - Writing zip archives that only carry new or modified files, plus a
//!   manifest of every file seen
//! - Restoring archives without touching anything already on disk
//! - Listing, rotating and deleting archives
//! - Running operations in the background with cooperative cancellation
//!
//! ## Modules
//!
//! - [`activity`] - Persistent history of user-facing outcomes
//! - [`backup`] - Manifest, backup and restore strategies, archive repository
//! - [`config`] - Settings and on-disk layout
//! - [`error`] - Error types and Result alias
//! - [`orchestrator`] - Scanner, strategies and repository wired together
//! - [`recovery`] - Retry policy for recoverable failures
//! - [`scanner`] - Folder walking and exclusions
//! - [`task`] - Background jobs, progress events and cancellation
//!
//! ## Example
//!
//! ```no_run
//! use hirz_core::{AppPaths, BackupOrchestrator, Settings};
//!
//! let paths = AppPaths::detect().expect("no home directory");
//! let settings = Settings::load(&paths.settings_file());
//! let orchestrator = BackupOrchestrator::for_paths(&paths);
//!
//! let destination = orchestrator.repository().new_archive_path().expect("backup dir");
//! let report = orchestrator
//!     .create_incremental_backup(
//!         &settings.selected_folders(&paths),
//!         &destination,
//!         &settings.effective_exclusions(),
//!         &|p| println!("{}", p),
//!         &|| true,
//!     )
//!     .expect("backup failed");
//! println!("Copied {} of {} files", report.files_copied, report.files_scanned);
//! ```

pub mod activity;
pub mod backup;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scanner;
pub mod task;

// Re-export key types for convenience

// Error types
pub use error::{Error, ErrorCategory, ErrorSeverity, Operation, Result};

// Configuration
pub use config::{AppPaths, FolderSetting, Settings};

// Scanning
pub use scanner::{ExclusionSet, FileScanner};

// Backup and restore
pub use backup::{
    format_age, format_size, ArchiveInfo, ArchiveWritten, BackupReport, BackupRepository,
    IncrementalBackupStrategy, Manifest, Progress, RestoreSummary, SmartRestoreStrategy,
};

// Orchestration
pub use orchestrator::BackupOrchestrator;
pub use recovery::RetryPolicy;
pub use task::{
    run_backup_job, run_restore_job, spawn_backup, spawn_restore, BackupJob, RestoreJob,
    TaskEvent, TaskHandle, TaskOutcome,
};

// Activity log
pub use activity::{ActivityEntry, ActivityLog, ActivityType};
