//! Activity log for tracking user actions
//!
//! Provides a persistent log of recent backups, restores, deletions and errors.

use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Maximum number of log entries to keep
pub const MAX_LOG_ENTRIES: usize = 50;

/// Type of activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    /// Backup operation
    Backup,
    /// Restore operation
    Restore,
    /// Archives deleted by hand
    Delete,
    /// Old archives removed by the retention policy
    Rotation,
    /// Operation stopped by the user
    Cancelled,
    /// Error occurred
    Error,
    /// Info message
    Info,
}

impl ActivityType {
    /// Get the display name for this activity type
    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityType::Backup => "Backup",
            ActivityType::Restore => "Restore",
            ActivityType::Delete => "Delete",
            ActivityType::Rotation => "Rotation",
            ActivityType::Cancelled => "Cancelled",
            ActivityType::Error => "Error",
            ActivityType::Info => "Info",
        }
    }
}

/// A single activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Timestamp of the activity
    pub timestamp: DateTime<Local>,
    /// Type of activity
    pub activity_type: ActivityType,
    /// Description of what happened
    pub description: String,
    /// Additional details (optional)
    pub details: Option<String>,
}

impl ActivityEntry {
    /// Create a new activity entry with the current timestamp
    pub fn new(activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            activity_type,
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(
        activity_type: ActivityType,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(activity_type, description)
        }
    }

    /// Format the full timestamp with date
    pub fn formatted_datetime(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Activity log backed by a JSON-lines file, most recent entry first
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    /// Create an empty log that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the log from `path`.
    ///
    /// A missing file gives an empty log. Lines that do not parse are
    /// dropped.
    pub fn load(path: &Path) -> Self {
        let mut log = Self::new(path);
        let Ok(file) = File::open(path) else {
            return log;
        };

        let reader = BufReader::new(file);
        for line in reader.lines().map_while(|l| l.ok()) {
            if log.entries.len() >= MAX_LOG_ENTRIES {
                break;
            }
            match serde_json::from_str::<ActivityEntry>(&line) {
                Ok(entry) => log.entries.push(entry),
                Err(e) => tracing::debug!("Skipping unreadable activity line: {}", e),
            }
        }
        log
    }

    /// Save activity log to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }

        let mut file = File::create(&self.path).map_err(|e| Error::fs(&self.path, e))?;
        for entry in self.entries.iter().take(MAX_LOG_ENTRIES) {
            let json = serde_json::to_string(entry)?;
            writeln!(file, "{}", json).map_err(|e| Error::fs(&self.path, e))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a new entry to the log
    pub fn add(&mut self, entry: ActivityEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_LOG_ENTRIES);
    }

    /// Add a simple log entry
    pub fn log(&mut self, activity_type: ActivityType, description: impl Into<String>) {
        self.add(ActivityEntry::new(activity_type, description));
    }

    /// Add a log entry with details
    pub fn log_with_details(
        &mut self,
        activity_type: ActivityType,
        description: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.add(ActivityEntry::with_details(activity_type, description, details));
    }

    /// Get all entries
    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    /// Get the most recent N entries
    pub fn recent(&self, count: usize) -> &[ActivityEntry] {
        &self.entries[..count.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_activity_entry_creation() {
        let entry = ActivityEntry::new(ActivityType::Backup, "Backed up 12 files");
        assert_eq!(entry.activity_type, ActivityType::Backup);
        assert_eq!(entry.description, "Backed up 12 files");
        assert!(entry.details.is_none());

        let entry = ActivityEntry::with_details(ActivityType::Error, "Restore failed", "corrupt");
        assert_eq!(entry.details.as_deref(), Some("corrupt"));
    }

    #[test]
    fn test_most_recent_first_and_capped() {
        let temp = TempDir::new().unwrap();
        let mut log = ActivityLog::new(temp.path().join("activity.log"));
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            log.log(ActivityType::Info, format!("entry {}", i));
        }

        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        assert_eq!(
            log.recent(1)[0].description,
            format!("entry {}", MAX_LOG_ENTRIES + 4)
        );
        assert_eq!(log.recent(500).len(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/activity.log");

        let mut log = ActivityLog::new(&path);
        log.log(ActivityType::Backup, "first");
        log.log_with_details(ActivityType::Rotation, "second", "2 archives removed");
        log.save().unwrap();

        let loaded = ActivityLog::load(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[0].description, "second");
        assert_eq!(loaded.entries()[0].activity_type, ActivityType::Rotation);
        assert_eq!(loaded.entries()[1].description, "first");
    }

    #[test]
    fn test_load_skips_bad_lines_and_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(ActivityLog::load(&temp.path().join("none.log")).is_empty());

        let path = temp.path().join("activity.log");
        let mut log = ActivityLog::new(&path);
        log.log(ActivityType::Restore, "ok");
        log.save().unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.insert_str(0, "not json\n");
        std::fs::write(&path, content).unwrap();

        let loaded = ActivityLog::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].description, "ok");
    }
}
