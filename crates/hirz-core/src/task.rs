//! Background execution of backup and restore jobs
//!
//! Each job runs on its own thread and reports back over a channel.
//! Cancellation is cooperative: [`TaskHandle::cancel`] clears a shared
//! flag that the strategies poll before every file.

use crate::backup::{format_size, ArchiveWritten, Progress, ProgressCallback, RunningCheck};
use crate::error::{Error, ErrorCategory, ErrorSeverity, Operation};
use crate::orchestrator::BackupOrchestrator;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything a backup run needs
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub folders: Vec<PathBuf>,
    /// Archive to create; removed again if the run does not succeed
    pub destination: PathBuf,
    pub exclusions: Vec<String>,
    /// Archives to keep after a successful run, `None` to skip rotation
    pub retention: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub archive: PathBuf,
}

/// Terminal result of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed {
        message: String,
    },
    /// The user asked to stop; not an error
    Cancelled {
        message: String,
    },
    Failed {
        message: String,
        category: ErrorCategory,
        severity: ErrorSeverity,
    },
}

impl TaskOutcome {
    pub fn message(&self) -> &str {
        match self {
            TaskOutcome::Completed { message }
            | TaskOutcome::Cancelled { message }
            | TaskOutcome::Failed { message, .. } => message,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled { .. })
    }

    fn from_error(err: &Error, operation: Operation) -> Self {
        if err.is_interrupted() {
            return TaskOutcome::Cancelled {
                message: format!("{} cancelled by user.", operation),
            };
        }
        TaskOutcome::Failed {
            message: format!("{} failed: {}", operation, err),
            category: err.category(),
            severity: err.severity(),
        }
    }
}

/// Messages sent from a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Progress(Progress),
    Finished(TaskOutcome),
}

/// Run a backup job on the current thread.
///
/// If the run is cancelled or fails, the destination archive is deleted.
/// After a successful run the retention policy is applied; rotation
/// problems are logged and do not change the outcome.
pub fn run_backup_job(
    orchestrator: &BackupOrchestrator,
    job: &BackupJob,
    progress: ProgressCallback<'_>,
    is_running: RunningCheck<'_>,
) -> TaskOutcome {
    let result = orchestrator.create_incremental_backup(
        &job.folders,
        &job.destination,
        &job.exclusions,
        progress,
        is_running,
    );

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            remove_incomplete_archive(&job.destination);
            if e.is_interrupted() {
                tracing::info!("Backup cancelled, removed {}", job.destination.display());
            } else {
                tracing::error!(
                    category = %e.category(),
                    severity = %e.severity(),
                    "Backup failed: {}",
                    e
                );
            }
            return TaskOutcome::from_error(&e, Operation::Backup);
        }
    };

    if let Some(retain) = job.retention {
        let deleted = orchestrator.repository().apply_rotation(retain);
        if deleted > 0 {
            tracing::info!("Rotation removed {} old backups", deleted);
        }
    }

    let message = match report.archive {
        ArchiveWritten::Skipped => "No new files were found to back up.".to_string(),
        ArchiveWritten::Full | ArchiveWritten::ManifestOnly => {
            let size = fs::metadata(&job.destination)
                .map(|m| m.len())
                .unwrap_or(0);
            format!(
                "Backup created: {} ({}, {} files copied)",
                job.destination.display(),
                format_size(size),
                report.files_copied
            )
        }
    };
    TaskOutcome::Completed { message }
}

fn remove_incomplete_archive(path: &std::path::Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "Failed to remove incomplete archive {}: {}",
            path.display(),
            e
        ),
    }
}

/// Run a restore job on the current thread. Nothing is ever deleted.
pub fn run_restore_job(
    orchestrator: &BackupOrchestrator,
    job: &RestoreJob,
    progress: ProgressCallback<'_>,
    is_running: RunningCheck<'_>,
) -> TaskOutcome {
    match orchestrator.restore_from_backup(&job.archive, progress, is_running) {
        Ok(summary) => TaskOutcome::Completed {
            message: summary.to_string(),
        },
        Err(e) => {
            if !e.is_interrupted() {
                tracing::error!(
                    category = %e.category(),
                    severity = %e.severity(),
                    "Restore failed: {}",
                    e
                );
            }
            TaskOutcome::from_error(&e, Operation::Restore)
        }
    }
}

/// Handle to a job running in the background
pub struct TaskHandle {
    running: Arc<AtomicBool>,
    events: Receiver<TaskEvent>,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Ask the job to stop at its next file boundary
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Shared flag, for cancelling from another thread or task
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_cancel_requested(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Progress events followed by exactly one `Finished`
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.events
    }

    /// Wait for the worker thread to exit
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Background task panicked");
            }
        }
    }
}

/// Start a backup job on a new thread
pub fn spawn_backup(orchestrator: BackupOrchestrator, job: BackupJob) -> TaskHandle {
    spawn(move |progress, is_running| run_backup_job(&orchestrator, &job, progress, is_running))
}

/// Start a restore job on a new thread
pub fn spawn_restore(orchestrator: BackupOrchestrator, job: RestoreJob) -> TaskHandle {
    spawn(move |progress, is_running| run_restore_job(&orchestrator, &job, progress, is_running))
}

fn spawn<F>(work: F) -> TaskHandle
where
    F: FnOnce(ProgressCallback<'_>, RunningCheck<'_>) -> TaskOutcome + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel::<TaskEvent>();

    let flag = Arc::clone(&running);
    let handle = thread::spawn(move || {
        let progress_tx: Sender<TaskEvent> = tx.clone();
        let on_progress = move |p: Progress| {
            let _ = progress_tx.send(TaskEvent::Progress(p));
        };
        let is_running = move || flag.load(Ordering::SeqCst);

        let outcome = work(&on_progress, &is_running);
        let _ = tx.send(TaskEvent::Finished(outcome));
    });

    TaskHandle {
        running,
        events: rx,
        handle: Some(handle),
    }
}
