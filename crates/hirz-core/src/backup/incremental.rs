//! Incremental archive creation

use crate::config::MANIFEST_FILENAME;
use crate::config::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{Error, Operation, Result};
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{
    file_mtime, truncate_name, ArchiveWritten, BackupReport, Manifest, Progress,
    ProgressCallback, RunningCheck,
};

/// Entries at or above this size need zip64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// A file selected for copying
#[derive(Debug, Clone)]
struct ScannedFile {
    path: PathBuf,
    relative: String,
}

/// Which files to copy and the manifest describing the full scan
#[derive(Debug)]
struct BackupPlan {
    selected: Vec<ScannedFile>,
    manifest: Manifest,
}

/// Copies files that are new or modified since the previous manifest
#[derive(Debug, Clone)]
pub struct IncrementalBackupStrategy {
    previous: Manifest,
    base: PathBuf,
    compression_level: u8,
}

impl IncrementalBackupStrategy {
    /// `previous` may be empty, in which case every file is copied
    pub fn new(previous: Manifest, base: impl Into<PathBuf>) -> Self {
        Self {
            previous,
            base: base.into(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Deflate level (0-9) used for every entry
    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Write a new archive at `destination`.
    ///
    /// Only new or modified files are copied, but the embedded manifest
    /// lists every file in `files`. When nothing needs copying, a
    /// manifest-only archive is written if the set of paths changed,
    /// otherwise no archive is created. If `is_running` turns false the
    /// run stops with [`Error::Interrupted`] and the caller is expected to
    /// delete the incomplete destination.
    pub fn create_backup(
        &self,
        files: &[PathBuf],
        destination: &Path,
        progress: ProgressCallback<'_>,
        is_running: RunningCheck<'_>,
    ) -> Result<BackupReport> {
        let plan = self.plan(files, destination)?;
        let total = plan.selected.len();

        tracing::info!(
            scanned = files.len(),
            selected = total,
            previous = self.previous.len(),
            "Planned incremental backup"
        );

        if total == 0 {
            progress(Progress::new(100, "No new or modified files to copy."));
            if self.previous.same_paths(&plan.manifest) {
                tracing::info!("Nothing changed since the last backup, skipping archive");
                return Ok(BackupReport {
                    files_scanned: files.len(),
                    files_copied: 0,
                    bytes_copied: 0,
                    archive: ArchiveWritten::Skipped,
                });
            }

            tracing::info!("File set changed, writing manifest-only archive");
            self.write_manifest_only(destination, &plan.manifest)?;
            return Ok(BackupReport {
                files_scanned: files.len(),
                files_copied: 0,
                bytes_copied: 0,
                archive: ArchiveWritten::ManifestOnly,
            });
        }

        let file = File::create(destination).map_err(|e| Error::fs(destination, e))?;
        let mut zip = ZipWriter::new(file);
        let options = self.entry_options();
        let mut bytes_copied = 0u64;

        for (i, scanned) in plan.selected.iter().enumerate() {
            if !is_running() {
                tracing::info!("Backup cancelled by user at file {}/{}", i, total);
                return Err(Error::Interrupted {
                    operation: Operation::Backup,
                });
            }

            let percent = 10 + (i * 85 / total) as u8;
            let name = scanned
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress(Progress::new(
                percent,
                format!("Compressing: {}", truncate_name(&name, 30)),
            ));

            bytes_copied += add_file_to_zip(
                &mut zip,
                &scanned.path,
                &scanned.relative,
                options,
                destination,
            )?;
        }

        progress(Progress::new(98, "Writing backup manifest..."));
        write_manifest_entry(&mut zip, &plan.manifest, options, destination)?;
        zip.finish().map_err(|e| Error::from_zip_write(destination, e))?;

        progress(Progress::new(100, "Compression complete."));

        Ok(BackupReport {
            files_scanned: files.len(),
            files_copied: total,
            bytes_copied,
            archive: ArchiveWritten::Full,
        })
    }

    /// Snapshot every file once and decide what to copy
    fn plan(&self, files: &[PathBuf], destination: &Path) -> Result<BackupPlan> {
        let mut selected = Vec::new();
        let mut manifest = Manifest::new();

        for path in files {
            let relative = path
                .strip_prefix(&self.base)
                .map(crate::scanner::to_archive_path)
                .map_err(|_| Error::Backup {
                    archive: destination.to_path_buf(),
                    reason: format!(
                        "{} is outside {}",
                        path.display(),
                        self.base.display()
                    ),
                })?;
            // Overlapping roots can yield the same file twice
            if manifest.contains(&relative) {
                continue;
            }
            let mtime = file_mtime(path)?;

            if self.previous.needs_backup(&relative, mtime) {
                selected.push(ScannedFile {
                    path: path.clone(),
                    relative: relative.clone(),
                });
            }
            manifest.insert(relative, mtime);
        }

        Ok(BackupPlan { selected, manifest })
    }

    fn entry_options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level as i64))
    }

    fn write_manifest_only(&self, destination: &Path, manifest: &Manifest) -> Result<()> {
        let file = File::create(destination).map_err(|e| Error::fs(destination, e))?;
        let mut zip = ZipWriter::new(file);
        write_manifest_entry(&mut zip, manifest, self.entry_options(), destination)?;
        zip.finish().map_err(|e| Error::from_zip_write(destination, e))?;
        Ok(())
    }
}

/// Stream one file into the archive, returning its size
fn add_file_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    file_path: &Path,
    archive_path: &str,
    options: SimpleFileOptions,
    destination: &Path,
) -> Result<u64> {
    let mut file = File::open(file_path).map_err(|e| Error::fs(file_path, e))?;
    let size = file.metadata().map_err(|e| Error::fs(file_path, e))?.len();

    zip.start_file(archive_path, options.large_file(size >= ZIP64_THRESHOLD))
        .map_err(|e| Error::from_zip_write(destination, e))?;
    io::copy(&mut file, zip).map_err(|e| Error::fs(file_path, e))?;

    Ok(size)
}

fn write_manifest_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    manifest: &Manifest,
    options: SimpleFileOptions,
    destination: &Path,
) -> Result<()> {
    let bytes = manifest.to_json_bytes()?;
    zip.start_file(MANIFEST_FILENAME, options)
        .map_err(|e| Error::from_zip_write(destination, e))?;
    zip.write_all(&bytes).map_err(|e| Error::fs(destination, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn write_file(path: &Path, content: &str, secs: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn read_manifest(archive: &Path) -> Manifest {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut entry = zip.by_name(MANIFEST_FILENAME).unwrap();
        let mut bytes = Vec::new();
        io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        Manifest::from_json_slice(&bytes).unwrap()
    }

    #[test]
    fn test_only_changed_files_are_copied() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let same = home.join("Documents/same.txt");
        let newer = home.join("Documents/newer.txt");
        let added = home.join("Documents/added.txt");
        write_file(&same, "same", 1_000);
        write_file(&newer, "newer", 2_000);
        write_file(&added, "added", 3_000);

        let mut previous = Manifest::new();
        previous.insert("Documents/same.txt", 1_000.0);
        previous.insert("Documents/newer.txt", 1_500.0);
        previous.insert("Documents/deleted.txt", 500.0);

        let dest = temp.path().join("out.zip");
        let strategy = IncrementalBackupStrategy::new(previous, &home);
        let report = strategy
            .create_backup(
                &[same.clone(), newer.clone(), added.clone()],
                &dest,
                &|_| {},
                &|| true,
            )
            .unwrap();

        assert_eq!(report.archive, ArchiveWritten::Full);
        assert_eq!(report.files_copied, 2);
        assert_eq!(
            entry_names(&dest),
            vec![
                "Documents/newer.txt".to_string(),
                "Documents/added.txt".to_string(),
                MANIFEST_FILENAME.to_string(),
            ]
        );

        let manifest = read_manifest(&dest);
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.get("Documents/same.txt"), Some(1_000.0));
        assert!(!manifest.contains("Documents/deleted.txt"));
    }

    #[test]
    fn test_progress_runs_from_ten_to_hundred() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let files: Vec<PathBuf> = (0..4)
            .map(|i| {
                let path = home.join(format!("Music/track{}.mp3", i));
                write_file(&path, "la", 100);
                path
            })
            .collect();

        let seen = RefCell::new(Vec::new());
        let strategy = IncrementalBackupStrategy::new(Manifest::new(), &home);
        strategy
            .create_backup(
                &files,
                &temp.path().join("out.zip"),
                &|p| seen.borrow_mut().push(p.percent),
                &|| true,
            )
            .unwrap();

        assert_eq!(*seen.borrow(), vec![10, 31, 52, 73, 98, 100]);
    }

    #[test]
    fn test_removed_file_writes_manifest_only_archive() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let kept = home.join("Pictures/kept.png");
        write_file(&kept, "png", 100);

        let mut previous = Manifest::new();
        previous.insert("Pictures/kept.png", 100.0);
        previous.insert("Pictures/gone.png", 100.0);

        let dest = temp.path().join("out.zip");
        let report = IncrementalBackupStrategy::new(previous, &home)
            .create_backup(&[kept], &dest, &|_| {}, &|| true)
            .unwrap();

        assert_eq!(report.archive, ArchiveWritten::ManifestOnly);
        assert_eq!(entry_names(&dest), vec![MANIFEST_FILENAME.to_string()]);
        assert_eq!(read_manifest(&dest).len(), 1);
    }

    #[test]
    fn test_cancellation_stops_before_next_file() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let files: Vec<PathBuf> = (0..3)
            .map(|i| {
                let path = home.join(format!("Videos/clip{}.mp4", i));
                write_file(&path, "clip", 100);
                path
            })
            .collect();

        let polls = Cell::new(0);
        let err = IncrementalBackupStrategy::new(Manifest::new(), &home)
            .create_backup(&files, &temp.path().join("out.zip"), &|_| {}, &|| {
                polls.set(polls.get() + 1);
                polls.get() < 2
            })
            .unwrap_err();

        assert!(err.is_interrupted());
        assert_eq!(polls.get(), 2);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        fs::create_dir_all(&home).unwrap();

        let err = IncrementalBackupStrategy::new(Manifest::new(), &home)
            .create_backup(
                &[home.join("vanished.txt")],
                &temp.path().join("out.zip"),
                &|_| {},
                &|| true,
            )
            .unwrap_err();

        assert!(matches!(err, Error::FileSystem { .. }));
    }
}
