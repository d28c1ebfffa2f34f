//! Integration tests for backup, restore and rotation workflows.
//!
//! Each test builds a throwaway home directory, runs whole operations
//! through the orchestrator and inspects the archives left on disk.

use hirz_core::backup::{ArchiveWritten, BackupRepository, Manifest};
use hirz_core::config::{AppPaths, MANIFEST_FILENAME};
use hirz_core::recovery::RetryPolicy;
use hirz_core::task::{run_backup_job, run_restore_job, BackupJob, RestoreJob};
use hirz_core::BackupOrchestrator;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use zip::ZipArchive;

/// Test fixture with a home directory and the standard application layout.
struct TestFixture {
    _temp_dir: TempDir,
    paths: AppPaths,
    orchestrator: BackupOrchestrator,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let paths = AppPaths::with_home(temp_dir.path().join("home"));
        paths.ensure_dirs().expect("Failed to create app dirs");
        let orchestrator =
            BackupOrchestrator::for_paths(&paths).with_retry(RetryPolicy::none());

        Self {
            _temp_dir: temp_dir,
            paths,
            orchestrator,
        }
    }

    fn home(&self) -> &Path {
        &self.paths.home
    }

    fn repository(&self) -> &BackupRepository {
        self.orchestrator.repository()
    }

    /// Write a file under home with a fixed modification time
    fn write(&self, relative: &str, content: &str, mtime_secs: u64) -> PathBuf {
        let path = self.home().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        set_mtime(&path, mtime_secs);
        path
    }

    fn documents(&self) -> Vec<PathBuf> {
        vec![self.home().join("Documents")]
    }

    /// Run a backup of Documents into a uniquely named archive
    fn backup(&self, name: &str, exclusions: &[&str]) -> (PathBuf, ArchiveWritten) {
        let destination = self.paths.backup_dir.join(name);
        let exclusions: Vec<String> = exclusions.iter().map(|s| s.to_string()).collect();
        let report = self
            .orchestrator
            .create_incremental_backup(
                &self.documents(),
                &destination,
                &exclusions,
                &|_| {},
                &|| true,
            )
            .expect("backup failed");
        (destination, report.archive)
    }
}

fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn payload_entries(archive: &Path) -> BTreeSet<String> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .filter(|name| name != MANIFEST_FILENAME)
        .collect()
}

fn embedded_manifest(archive: &Path) -> Manifest {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut entry = zip.by_name(MANIFEST_FILENAME).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    Manifest::from_json_slice(&bytes).unwrap()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_first_backup_copies_everything() {
    let fixture = TestFixture::new();
    fixture.write("Documents/a.txt", "a", 1_000);
    fixture.write("Documents/sub/b.txt", "b", 1_000);
    fixture.write("Documents/sub/deeper/c.txt", "c", 1_000);

    let (archive, written) = fixture.backup("first.zip", &[]);

    assert_eq!(written, ArchiveWritten::Full);
    let expected = set(&[
        "Documents/a.txt",
        "Documents/sub/b.txt",
        "Documents/sub/deeper/c.txt",
    ]);
    assert_eq!(payload_entries(&archive), expected);

    let manifest = embedded_manifest(&archive);
    let keys: BTreeSet<String> = manifest.paths().map(str::to_string).collect();
    assert_eq!(keys, expected);
    assert_eq!(manifest.get("Documents/a.txt"), Some(1_000.0));
}

#[test]
fn test_unchanged_second_run_writes_nothing() {
    let fixture = TestFixture::new();
    fixture.write("Documents/a.txt", "a", 1_000);
    fixture.write("Documents/b.txt", "b", 1_000);
    fixture.write("Documents/c.txt", "c", 1_000);

    fixture.backup("first.zip", &[]);
    let (second, written) = fixture.backup("second.zip", &[]);

    assert_eq!(written, ArchiveWritten::Skipped);
    assert!(!second.exists());
    assert_eq!(fixture.repository().list().len(), 1);
}

#[test]
fn test_only_new_and_modified_files_are_copied() {
    let fixture = TestFixture::new();
    fixture.write("Documents/same.txt", "same", 1_000);
    let edited = fixture.write("Documents/edited.txt", "v1", 1_000);
    let (first, _) = fixture.backup("first.zip", &[]);
    set_mtime(&first, 10_000);

    fs::write(&edited, "v2").unwrap();
    set_mtime(&edited, 2_000);
    fixture.write("Documents/new.txt", "new", 500);

    let (second, written) = fixture.backup("second.zip", &[]);
    assert_eq!(written, ArchiveWritten::Full);
    assert_eq!(
        payload_entries(&second),
        set(&["Documents/edited.txt", "Documents/new.txt"])
    );

    // Unchanged files are still tracked
    let manifest = embedded_manifest(&second);
    assert_eq!(manifest.len(), 3);
    assert_eq!(manifest.get("Documents/same.txt"), Some(1_000.0));
    assert_eq!(manifest.get("Documents/edited.txt"), Some(2_000.0));
}

#[test]
fn test_older_mtime_is_not_copied_again() {
    let fixture = TestFixture::new();
    let file = fixture.write("Documents/a.txt", "a", 5_000);
    let (first, _) = fixture.backup("first.zip", &[]);
    set_mtime(&first, 10_000);

    // Clock went backwards: the file is considered unchanged
    set_mtime(&file, 4_000);
    let (_, written) = fixture.backup("second.zip", &[]);
    assert_eq!(written, ArchiveWritten::Skipped);
}

#[test]
fn test_deleted_file_produces_manifest_only_archive() {
    let fixture = TestFixture::new();
    fixture.write("Documents/keep.txt", "k", 1_000);
    let gone = fixture.write("Documents/gone.txt", "g", 1_000);
    let (first, _) = fixture.backup("first.zip", &[]);
    set_mtime(&first, 10_000);

    fs::remove_file(gone).unwrap();
    let (second, written) = fixture.backup("second.zip", &[]);

    assert_eq!(written, ArchiveWritten::ManifestOnly);
    assert!(payload_entries(&second).is_empty());
    let manifest = embedded_manifest(&second);
    assert_eq!(manifest.len(), 1);
    assert!(manifest.contains("Documents/keep.txt"));
}

#[test]
fn test_excluded_directory_segments() {
    let fixture = TestFixture::new();
    fixture.write("Documents/app/__pycache__/foo.pyc", "bytecode", 1_000);
    fixture.write("Documents/app/__pycache__/notes.md", "x", 1_000);
    fixture.write("Documents/app/main.py", "print()", 1_000);
    fixture.write("Documents/.hidden/secret.txt", "s", 1_000);

    let (archive, _) = fixture.backup("first.zip", &["__pycache__", ".*"]);

    assert_eq!(payload_entries(&archive), set(&["Documents/app/main.py"]));
    assert_eq!(embedded_manifest(&archive).len(), 1);
}

#[test]
fn test_cancellation_after_second_file_deletes_archive() {
    let fixture = TestFixture::new();
    for i in 0..5 {
        fixture.write(&format!("Documents/file{}.txt", i), "data", 1_000);
    }

    let job = BackupJob {
        folders: fixture.documents(),
        destination: fixture.paths.backup_dir.join("cancelled.zip"),
        exclusions: Vec::new(),
        retention: None,
    };

    // Checked before each file: allow two, stop before the third
    let polls = Cell::new(0);
    let outcome = run_backup_job(&fixture.orchestrator, &job, &|_| {}, &|| {
        polls.set(polls.get() + 1);
        polls.get() <= 2
    });

    assert!(outcome.is_cancelled());
    assert_eq!(polls.get(), 3);
    assert!(!job.destination.exists());
    assert!(fixture.repository().list().is_empty());
}

#[test]
fn test_restore_twice_is_idempotent() {
    let fixture = TestFixture::new();
    fixture.write("Documents/a.txt", "alpha", 1_000);
    fixture.write("Documents/nested/b.txt", "beta", 1_000);
    let (archive, _) = fixture.backup("first.zip", &[]);

    fs::remove_dir_all(fixture.home().join("Documents")).unwrap();

    let first = fixture
        .orchestrator
        .restore_from_backup(&archive, &|_| {}, &|| true)
        .unwrap();
    assert_eq!(first.restored, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(
        fs::read_to_string(fixture.home().join("Documents/nested/b.txt")).unwrap(),
        "beta"
    );

    let second = fixture
        .orchestrator
        .restore_from_backup(&archive, &|_| {}, &|| true)
        .unwrap();
    assert_eq!(second.restored, 0);
    assert_eq!(second.skipped, 2);
}

#[test]
fn test_restore_job_reports_summary() {
    let fixture = TestFixture::new();
    fixture.write("Documents/a.txt", "alpha", 1_000);
    let (archive, _) = fixture.backup("first.zip", &[]);

    let outcome = run_restore_job(
        &fixture.orchestrator,
        &RestoreJob { archive },
        &|_| {},
        &|| true,
    );
    assert!(outcome.is_completed());
    assert_eq!(
        outcome.message(),
        "Restore completed: 0 files restored, 1 skipped (already exist)."
    );
}

#[test]
fn test_rotation_keeps_newest() {
    let fixture = TestFixture::new();
    let repo = fixture.repository();
    for i in 0..7u64 {
        let path = fixture.paths.backup_dir.join(format!("backup_{}.zip", i));
        fs::write(&path, b"placeholder").unwrap();
        set_mtime(&path, 1_000 + i * 100);
    }

    let deleted = repo.apply_rotation(3);

    assert_eq!(deleted, 4);
    let survivors: Vec<String> = repo
        .list()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(survivors, vec!["backup_6.zip", "backup_5.zip", "backup_4.zip"]);
    assert_eq!(repo.apply_rotation(3), 0);
}

#[test]
fn test_backup_job_applies_retention() {
    let fixture = TestFixture::new();
    for i in 0..4u64 {
        let path = fixture.paths.backup_dir.join(format!("old_{}.zip", i));
        fs::write(&path, b"placeholder").unwrap();
        set_mtime(&path, 1_000 + i);
    }
    fixture.write("Documents/a.txt", "a", 1_000);

    let job = BackupJob {
        folders: fixture.documents(),
        destination: fixture.repository().new_archive_path().unwrap(),
        exclusions: Vec::new(),
        retention: Some(2),
    };
    let outcome = run_backup_job(&fixture.orchestrator, &job, &|_| {}, &|| true);

    assert!(outcome.is_completed(), "{:?}", outcome);
    let remaining = fixture.repository().list();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0], job.destination);
}

#[test]
fn test_corrupt_latest_archive_means_full_backup() {
    let fixture = TestFixture::new();
    fixture.write("Documents/a.txt", "a", 1_000);
    fixture.write("Documents/b.txt", "b", 1_000);
    let (first, _) = fixture.backup("first.zip", &[]);
    set_mtime(&first, 10_000);

    let broken = fixture.paths.backup_dir.join("broken.zip");
    fs::write(&broken, b"not a zip").unwrap();
    set_mtime(&broken, 20_000);

    assert!(fixture.repository().latest_manifest().is_empty());
    let (second, written) = fixture.backup("second.zip", &[]);
    assert_eq!(written, ArchiveWritten::Full);
    assert_eq!(payload_entries(&second).len(), 2);
}
