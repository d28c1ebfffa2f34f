//! Incremental backup, smart restore and archive management
//!
//! This module provides:
//! - [`Manifest`] - the path -> mtime snapshot embedded in each archive
//! - [`IncrementalBackupStrategy`] - copies only new or modified files
//! - [`SmartRestoreStrategy`] - extracts without overwriting anything
//! - [`BackupRepository`] - lists, rotates and deletes archives

mod incremental;
mod manifest;
mod repository;
mod restore;

pub use incremental::*;
pub use manifest::*;
pub use repository::*;
pub use restore::*;

use std::fmt;
use std::time::SystemTime;

/// One progress notification: percentage and a short status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub status: String,
}

impl Progress {
    pub fn new(percent: u8, status: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            status: status.into(),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>3}%] {}", self.percent, self.status)
    }
}

/// Receives progress updates; may see values go down and up again across retries
pub type ProgressCallback<'a> = &'a dyn Fn(Progress);

/// Polled before each file; returning false asks the operation to stop
pub type RunningCheck<'a> = &'a dyn Fn() -> bool;

/// What a backup run ended up writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveWritten {
    /// File entries plus the manifest
    Full,
    /// Nothing to copy but the set of paths changed, so only the manifest
    ManifestOnly,
    /// Nothing changed at all; no archive was created
    Skipped,
}

/// Result of one incremental backup run
#[derive(Debug, Clone, PartialEq)]
pub struct BackupReport {
    /// Files seen by the scan (all of them land in the new manifest)
    pub files_scanned: usize,
    /// Files whose bytes were copied into the archive
    pub files_copied: usize,
    /// Uncompressed bytes copied
    pub bytes_copied: u64,
    pub archive: ArchiveWritten,
}

/// Keep at most `max` characters of a name, marking the cut
pub(crate) fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let cut: String = name.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Format bytes to human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format age relative to now
pub fn format_age(time: SystemTime) -> String {
    let secs = SystemTime::now()
        .duration_since(time)
        .unwrap_or_default()
        .as_secs();

    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{} min ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else if secs < 604800 {
        format!("{} days ago", secs / 86400)
    } else {
        format!("{} weeks ago", secs / 604800)
    }
}
