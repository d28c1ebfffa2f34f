//! Smart restore: extract everything that is not already on disk

use crate::config::MANIFEST_FILENAME;
use crate::error::{Error, Operation, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::{truncate_name, Progress, ProgressCallback, RunningCheck};

/// Counts reported at the end of a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Entries written to disk
    pub restored: usize,
    /// Entries left alone because the target already existed
    pub skipped: usize,
}

impl RestoreSummary {
    pub fn total(&self) -> usize {
        self.restored + self.skipped
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Restore completed: {} files restored, {} skipped (already exist).",
            self.restored, self.skipped
        )
    }
}

/// Extracts archive entries under a target directory without overwriting.
///
/// An entry whose target path already exists, as a file, directory or
/// symlink, is skipped. Nothing is ever deleted, so an interrupted restore
/// can simply be run again.
#[derive(Debug, Clone)]
pub struct SmartRestoreStrategy {
    target: PathBuf,
}

impl SmartRestoreStrategy {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn restore_backup(
        &self,
        source: &Path,
        progress: ProgressCallback<'_>,
        is_running: RunningCheck<'_>,
    ) -> Result<RestoreSummary> {
        self.restore_tracked(source, progress, is_running, &mut BTreeSet::new())
    }

    /// Like [`restore_backup`](Self::restore_backup), but remembers every
    /// path it writes in `created`.
    ///
    /// Paths already in `created` were written by an earlier attempt of the
    /// same restore, so finding them on disk counts as restored, not skipped.
    pub fn restore_tracked(
        &self,
        source: &Path,
        progress: ProgressCallback<'_>,
        is_running: RunningCheck<'_>,
        created: &mut BTreeSet<PathBuf>,
    ) -> Result<RestoreSummary> {
        let file = File::open(source).map_err(|e| Error::fs(source, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| Error::from_zip_read(source, e))?;

        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| Error::from_zip_read(source, e))?;
            if entry.name() != MANIFEST_FILENAME {
                entries.push(i);
            }
        }

        let total = entries.len();
        tracing::info!(
            archive = %source.display(),
            entries = total,
            "Restoring archive"
        );

        let mut summary = RestoreSummary::default();

        for (i, index) in entries.into_iter().enumerate() {
            if !is_running() {
                tracing::info!("Restore cancelled by user at entry {}/{}", i, total);
                return Err(Error::Interrupted {
                    operation: Operation::Restore,
                });
            }

            let mut entry = archive
                .by_index(index)
                .map_err(|e| Error::from_zip_read(source, e))?;
            let name = entry.name().to_string();

            let percent = ((i + 1) * 100 / total) as u8;
            progress(Progress::new(
                percent,
                format!("Processing: {}", truncate_name(&name, 40)),
            ));

            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!("Skipping entry with unsafe path: {}", name);
                summary.skipped += 1;
                continue;
            };
            let outpath = self.target.join(relative);

            if fs::symlink_metadata(&outpath).is_ok() {
                if created.contains(&outpath) {
                    summary.restored += 1;
                } else {
                    summary.skipped += 1;
                }
                continue;
            }

            if entry.is_dir() {
                fs::create_dir_all(&outpath).map_err(|e| Error::fs(&outpath, e))?;
                created.insert(outpath);
                summary.restored += 1;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
            }

            let mut outfile = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&outpath)
            {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(Error::fs(&outpath, e)),
            };

            if let Err(e) = io::copy(&mut entry, &mut outfile) {
                drop(outfile);
                // Only the file this run created is removed
                let _ = fs::remove_file(&outpath);
                return Err(match e.kind() {
                    io::ErrorKind::InvalidData => Error::CorruptArchive {
                        archive: source.to_path_buf(),
                        reason: format!("{}: {}", name, e),
                    },
                    _ => Error::fs(&outpath, e),
                });
            }

            created.insert(outpath);
            summary.restored += 1;
        }

        tracing::info!(
            restored = summary.restored,
            skipped = summary.skipped,
            "Restore finished"
        );
        Ok(summary)
    }
}
