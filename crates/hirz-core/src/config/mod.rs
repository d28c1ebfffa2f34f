//! Persistent settings and directory layout

mod paths;

pub use paths::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_RETENTION: usize = 5;
pub const MAX_RETENTION: usize = 100;
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Exclusion patterns applied when the user has not customised them
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "__pycache__",
    "*.tmp",
    "*.bak",
    "*.log",
    "node_modules",
    "*.cache",
    "*.swp",
    "*.swo",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    "CVS",
    "Thumbs.db",
    ".DS_Store",
    "desktop.ini",
    "*.iso",
    "*.img",
    "*.vmdk",
    "*.vdi",
    ".vscode",
    ".idea",
    "*.sublime-*",
    "build",
    "dist",
    "target",
    "bin",
    "obj",
    ".npm",
    ".yarn",
    ".gradle",
    ".m2",
];

/// Pattern added to the exclusions when hidden files are ignored
const HIDDEN_PATTERN: &str = ".*";

/// A folder the user has configured, with its on/off switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSetting {
    pub path: PathBuf,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// User settings stored as `settings.json` in the application directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Glob patterns matched against path segments and file names
    pub exclusions: Vec<String>,
    /// Saved folder choices (defaults that were toggled and custom folders)
    pub folders: Vec<FolderSetting>,
    /// How many archives to keep after a successful backup
    pub retention: usize,
    pub ignore_hidden_files: bool,
    /// Deflate level for archive entries (0-9)
    pub compression_level: u8,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            folders: Vec::new(),
            retention: DEFAULT_RETENTION,
            ignore_hidden_files: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from disk.
    ///
    /// A missing file yields defaults, which are written back. A file that
    /// cannot be read or parsed also yields defaults, but is left untouched.
    /// Individual values that are out of range fall back to their defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save(path) {
                tracing::warn!("Failed to write default settings to {}: {}", path.display(), e);
            }
            return settings;
        }

        match Self::read(path) {
            Ok(mut settings) => {
                settings.sanitize();
                settings
            }
            Err(e) => {
                tracing::error!("Failed to load settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validate and write settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| Error::fs(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RETENTION).contains(&self.retention) {
            return Err(Error::validation(
                "retention",
                format!("must be between 1 and {}, got {}", MAX_RETENTION, self.retention),
            ));
        }
        if self.compression_level > 9 {
            return Err(Error::validation(
                "compression_level",
                format!("must be between 0 and 9, got {}", self.compression_level),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::validation(
                "log_level",
                format!("unknown level '{}'", self.log_level),
            ));
        }
        Ok(())
    }

    /// Replace out-of-range values with defaults
    fn sanitize(&mut self) {
        let defaults = Self::default();
        if !(1..=MAX_RETENTION).contains(&self.retention) {
            tracing::warn!(
                "Invalid retention {} in settings, using {}",
                self.retention,
                defaults.retention
            );
            self.retention = defaults.retention;
        }
        if self.compression_level > 9 {
            tracing::warn!(
                "Invalid compression level {} in settings, using {}",
                self.compression_level,
                defaults.compression_level
            );
            self.compression_level = defaults.compression_level;
        }
        let level = self.log_level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.log_level = level;
        } else {
            tracing::warn!("Invalid log level '{}' in settings", self.log_level);
            self.log_level = defaults.log_level;
        }
        self.exclusions.retain(|p| !p.trim().is_empty());
    }

    /// Add an exclusion pattern. Returns false for blanks and duplicates.
    pub fn add_exclusion(&mut self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        if pattern.is_empty() || self.exclusions.iter().any(|p| p == pattern) {
            return false;
        }
        self.exclusions.push(pattern.to_string());
        true
    }

    pub fn remove_exclusion(&mut self, pattern: &str) -> bool {
        let before = self.exclusions.len();
        self.exclusions.retain(|p| p != pattern);
        self.exclusions.len() != before
    }

    /// Exclusions to hand to the scanner, including the hidden-file rule
    pub fn effective_exclusions(&self) -> Vec<String> {
        let mut patterns = self.exclusions.clone();
        if self.ignore_hidden_files && !patterns.iter().any(|p| p == HIDDEN_PATTERN) {
            patterns.push(HIDDEN_PATTERN.to_string());
        }
        patterns
    }

    /// Add a custom folder. It must be an existing directory not already listed.
    pub fn add_folder(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(Error::validation(
                "folder",
                format!("{} does not exist or is not a directory", path.display()),
            ));
        }
        if self.folders.iter().any(|f| f.path == path) {
            return Err(Error::validation(
                "folder",
                format!("{} is already added", path.display()),
            ));
        }
        self.folders.push(FolderSetting {
            path: path.to_path_buf(),
            enabled: true,
        });
        Ok(())
    }

    pub fn remove_folder(&mut self, path: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f.path != path);
        self.folders.len() != before
    }

    /// Switch a folder on or off, recording it if it was not saved yet
    pub fn set_folder_enabled(&mut self, path: &Path, enabled: bool) {
        match self.folders.iter_mut().find(|f| f.path == path) {
            Some(folder) => folder.enabled = enabled,
            None => self.folders.push(FolderSetting {
                path: path.to_path_buf(),
                enabled,
            }),
        }
    }

    pub fn set_retention(&mut self, retention: usize) -> Result<()> {
        if !(1..=MAX_RETENTION).contains(&retention) {
            return Err(Error::validation(
                "retention",
                format!("must be between 1 and {}, got {}", MAX_RETENTION, retention),
            ));
        }
        self.retention = retention;
        Ok(())
    }

    /// Drop every customization
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folders a backup run should cover.
    ///
    /// Default folders that exist under home come first, each enabled
    /// unless a saved entry turns it off, followed by enabled custom folders.
    pub fn selected_folders(&self, paths: &AppPaths) -> Vec<PathBuf> {
        let mut selected: Vec<PathBuf> = Vec::new();

        for folder in paths.default_folders() {
            let enabled = self
                .folders
                .iter()
                .find(|f| f.path == folder)
                .map(|f| f.enabled)
                .unwrap_or(true);
            if enabled {
                selected.push(folder);
            }
        }

        for folder in self.folders.iter().filter(|f| f.enabled) {
            if !selected.contains(&folder.path) {
                selected.push(folder.path.clone());
            }
        }

        selected
    }
}
