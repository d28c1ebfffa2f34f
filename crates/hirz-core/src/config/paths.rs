//! Application directory layout and fixed names

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Hidden directory under home shared by the suite of tools
pub const ROOT_CONFIG_DIR_NAME: &str = ".AlZanad";
/// This tool's directory inside [`ROOT_CONFIG_DIR_NAME`]
pub const TOOL_SUBDIR_NAME: &str = "alhirz";
pub const BACKUP_SUBDIR: &str = "backups";
/// Reserved archive entry that carries the manifest
pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const ACTIVITY_FILENAME: &str = "activity.log";
pub const LOG_SUBDIR: &str = "logs";

/// Folders under home that are offered for backup out of the box
pub const DEFAULT_FOLDERS: &[&str] = &[
    "Documents",
    "Downloads",
    "Desktop",
    "Pictures",
    "Music",
    "Videos",
];

/// Where everything lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Base every archived path is relative to
    pub home: PathBuf,
    /// `<home>/.AlZanad/alhirz`
    pub app_dir: PathBuf,
    /// `<app_dir>/backups`
    pub backup_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the layout for the current user
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not determine the home directory".to_string()))?;
        Ok(Self::with_home(home))
    }

    /// Build the layout under an arbitrary home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let app_dir = home.join(ROOT_CONFIG_DIR_NAME).join(TOOL_SUBDIR_NAME);
        let backup_dir = app_dir.join(BACKUP_SUBDIR);
        Self {
            home,
            app_dir,
            backup_dir,
        }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.app_dir.join(SETTINGS_FILENAME)
    }

    pub fn activity_file(&self) -> PathBuf {
        self.app_dir.join(ACTIVITY_FILENAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.app_dir.join(LOG_SUBDIR)
    }

    /// Create the application and backup directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.app_dir, &self.backup_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::fs(dir, e))?;
        }
        Ok(())
    }

    /// Default folders that actually exist under home
    pub fn default_folders(&self) -> Vec<PathBuf> {
        existing_default_folders(&self.home)
    }
}

fn existing_default_folders(home: &Path) -> Vec<PathBuf> {
    DEFAULT_FOLDERS
        .iter()
        .map(|name| home.join(name))
        .filter(|path| path.is_dir())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_home() {
        let paths = AppPaths::with_home("/home/someone");
        assert_eq!(
            paths.backup_dir,
            PathBuf::from("/home/someone/.AlZanad/alhirz/backups")
        );
        assert_eq!(
            paths.settings_file(),
            PathBuf::from("/home/someone/.AlZanad/alhirz/settings.json")
        );
    }

    #[test]
    fn test_default_folders_only_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("Music")).unwrap();
        std::fs::create_dir(temp.path().join("Documents")).unwrap();
        std::fs::write(temp.path().join("Videos"), b"not a dir").unwrap();

        let paths = AppPaths::with_home(temp.path());
        assert_eq!(
            paths.default_folders(),
            vec![temp.path().join("Documents"), temp.path().join("Music")]
        );
    }
}
