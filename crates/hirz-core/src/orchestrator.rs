//! Wires scanner, strategies and repository into whole operations

use crate::backup::{
    BackupReport, BackupRepository, IncrementalBackupStrategy, Progress, ProgressCallback,
    RestoreSummary, RunningCheck, SmartRestoreStrategy,
};
use crate::config::{AppPaths, DEFAULT_COMPRESSION_LEVEL};
use crate::error::Result;
use crate::recovery::RetryPolicy;
use crate::scanner::{ExclusionSet, FileScanner};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Runs backups and restores with explicitly supplied collaborators
#[derive(Debug, Clone)]
pub struct BackupOrchestrator {
    scanner: FileScanner,
    repository: BackupRepository,
    retry: RetryPolicy,
    compression_level: u8,
}

impl BackupOrchestrator {
    pub fn new(
        scanner: FileScanner,
        repository: BackupRepository,
        retry: RetryPolicy,
        compression_level: u8,
    ) -> Self {
        Self {
            scanner,
            repository,
            retry,
            compression_level,
        }
    }

    /// Standard layout: relative to home, archives in the backup directory
    pub fn for_paths(paths: &AppPaths) -> Self {
        Self::new(
            FileScanner::new(&paths.home),
            BackupRepository::new(&paths.backup_dir),
            RetryPolicy::default(),
            DEFAULT_COMPRESSION_LEVEL,
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    pub fn repository(&self) -> &BackupRepository {
        &self.repository
    }

    pub fn home(&self) -> &Path {
        self.scanner.base()
    }

    /// Scan `folders` and write an incremental archive at `destination`
    pub fn create_incremental_backup(
        &self,
        folders: &[PathBuf],
        destination: &Path,
        exclusions: &[String],
        progress: ProgressCallback<'_>,
        is_running: RunningCheck<'_>,
    ) -> Result<BackupReport> {
        tracing::info!(
            folders = folders.len(),
            exclusions = exclusions.len(),
            destination = %destination.display(),
            "Starting incremental backup"
        );

        progress(Progress::new(0, "Looking for previous backup..."));
        let previous = self.repository.latest_manifest();

        progress(Progress::new(5, "Scanning files..."));
        let exclusion_set = ExclusionSet::new(exclusions);
        let files = self.scanner.scan(folders, &exclusion_set);
        tracing::info!(files = files.len(), "Scan complete");

        let strategy = IncrementalBackupStrategy::new(previous, self.scanner.base())
            .with_compression_level(self.compression_level);

        let report = self.retry.run("backup", || {
            strategy.create_backup(&files, destination, progress, is_running)
        })?;

        tracing::info!(
            copied = report.files_copied,
            scanned = report.files_scanned,
            bytes = report.bytes_copied,
            "Backup finished"
        );
        Ok(report)
    }

    /// Restore `source` into the home directory, skipping existing paths.
    ///
    /// Files written by a failed attempt still count as restored when a
    /// retry finds them.
    pub fn restore_from_backup(
        &self,
        source: &Path,
        progress: ProgressCallback<'_>,
        is_running: RunningCheck<'_>,
    ) -> Result<RestoreSummary> {
        tracing::info!(archive = %source.display(), "Starting restore");
        let strategy = SmartRestoreStrategy::new(self.scanner.base());
        let mut created = BTreeSet::new();
        self.retry.run("restore", || {
            strategy.restore_tracked(source, progress, is_running, &mut created)
        })
    }
}
