//! Archive storage: listing, manifests, rotation

use crate::config::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::ZipArchive;

use super::{format_age, format_size, Manifest};

/// Prefix of every archive name
pub const ARCHIVE_PREFIX: &str = "backup_";
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Facts about one archive on disk
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
    /// Entries other than the manifest
    pub file_count: usize,
    pub has_manifest: bool,
}

impl ArchiveInfo {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Get human-readable size
    pub fn size_display(&self) -> String {
        format_size(self.size_bytes)
    }

    /// Get human-readable age
    pub fn age_display(&self) -> String {
        format_age(self.modified)
    }
}

/// Owns the backup directory and every archive in it
#[derive(Debug, Clone)]
pub struct BackupRepository {
    backup_dir: PathBuf,
}

impl BackupRepository {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Ensure the backup directory exists
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.backup_dir).map_err(|e| Error::fs(&self.backup_dir, e))
    }

    /// All archives, newest first.
    ///
    /// Ordering is by modification time, ties broken by name descending.
    /// A missing or unreadable directory yields an empty list.
    pub fn list(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if self.backup_dir.exists() {
                    tracing::warn!(
                        "Cannot read backup directory {}: {}",
                        self.backup_dir.display(),
                        e
                    );
                }
                return Vec::new();
            }
        };

        let mut archives: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|e| e == ARCHIVE_EXTENSION)
                        .unwrap_or(false)
            })
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        archives.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        archives.into_iter().map(|(_, path)| path).collect()
    }

    pub fn latest(&self) -> Option<PathBuf> {
        self.list().into_iter().next()
    }

    /// Manifest of the newest archive.
    ///
    /// Never fails: no archives, an archive that cannot be opened, or a
    /// missing or corrupt manifest all give an empty manifest, so the next
    /// backup copies everything.
    pub fn latest_manifest(&self) -> Manifest {
        let Some(latest) = self.latest() else {
            tracing::debug!("No previous backup found");
            return Manifest::new();
        };

        match self.read_manifest(&latest) {
            Ok(manifest) => {
                tracing::debug!(
                    archive = %latest.display(),
                    entries = manifest.len(),
                    "Loaded previous manifest"
                );
                manifest
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read manifest from {}, treating as fresh backup: {}",
                    latest.display(),
                    e
                );
                Manifest::new()
            }
        }
    }

    /// Read the manifest embedded in one archive
    pub fn read_manifest(&self, archive_path: &Path) -> Result<Manifest> {
        let file = File::open(archive_path).map_err(|e| Error::fs(archive_path, e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| Error::from_zip_read(archive_path, e))?;
        let mut entry = archive
            .by_name(MANIFEST_FILENAME)
            .map_err(|e| Error::from_zip_read(archive_path, e))?;

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|e| Error::CorruptArchive {
            archive: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Manifest::from_json_slice(&bytes).map_err(|e| Error::CorruptArchive {
            archive: archive_path.to_path_buf(),
            reason: format!("invalid manifest: {}", e),
        })
    }

    /// Delete archives, continuing past failures. Returns how many were removed.
    pub fn delete(&self, paths: &[PathBuf]) -> usize {
        let mut deleted = 0;
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!("Deleted backup {}", path.display());
                    deleted += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to delete backup {}: {}", path.display(), e);
                }
            }
        }
        deleted
    }

    /// Keep the `retain` newest archives and delete the rest
    pub fn apply_rotation(&self, retain: usize) -> usize {
        let archives = self.list();
        if archives.len() <= retain {
            return 0;
        }

        let stale = &archives[retain..];
        let deleted = self.delete(stale);
        tracing::info!(
            retain,
            candidates = stale.len(),
            deleted,
            "Applied retention policy"
        );
        deleted
    }

    /// Fresh timestamped path for the next archive.
    ///
    /// Creates the backup directory if needed. When two runs land in the
    /// same second a numeric suffix keeps the names distinct.
    pub fn new_archive_path(&self) -> Result<PathBuf> {
        self.ensure_dir()?;

        let stem = format!(
            "{}{}",
            ARCHIVE_PREFIX,
            Local::now().format("%Y-%m-%d_%H%M%S")
        );
        let mut candidate = self
            .backup_dir
            .join(format!("{}.{}", stem, ARCHIVE_EXTENSION));
        let mut suffix = 2;
        while candidate.exists() {
            candidate = self
                .backup_dir
                .join(format!("{}_{}.{}", stem, suffix, ARCHIVE_EXTENSION));
            suffix += 1;
        }
        Ok(candidate)
    }

    /// Size, age and entry counts of one archive
    pub fn describe(&self, path: &Path) -> Result<ArchiveInfo> {
        let metadata = fs::metadata(path).map_err(|e| Error::fs(path, e))?;
        let modified = metadata.modified().map_err(|e| Error::fs(path, e))?;

        let file = File::open(path).map_err(|e| Error::fs(path, e))?;
        let archive = ZipArchive::new(file).map_err(|e| Error::from_zip_read(path, e))?;
        let has_manifest = archive.file_names().any(|n| n == MANIFEST_FILENAME);
        let file_count = archive.len() - usize::from(has_manifest);

        Ok(ArchiveInfo {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified,
            file_count,
            has_manifest,
        })
    }
}
