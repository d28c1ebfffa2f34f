//! Error types for hirz-core

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `ENOSPC` on Linux and macOS, `ERROR_DISK_FULL` on Windows.
#[cfg(unix)]
const OUT_OF_SPACE_CODES: &[i32] = &[28];
#[cfg(windows)]
const OUT_OF_SPACE_CODES: &[i32] = &[39, 112];
#[cfg(not(any(unix, windows)))]
const OUT_OF_SPACE_CODES: &[i32] = &[];

/// Which long-running operation an error or interruption belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Backup => write!(f, "Backup"),
            Operation::Restore => write!(f, "Restore"),
        }
    }
}

/// Broad error category, used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    FileSystem,
    BackupOperation,
    RestoreOperation,
    Validation,
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::FileSystem => "file_system",
            ErrorCategory::BackupOperation => "backup_operation",
            ErrorCategory::RestoreOperation => "restore_operation",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// How bad an error is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Main error type for hirz operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("File system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write backup archive {}: {reason}", archive.display())]
    Backup { archive: PathBuf, reason: String },

    #[error("Backup archive is corrupt or unreadable: {}: {reason}", archive.display())]
    CorruptArchive { archive: PathBuf, reason: String },

    #[error("{operation} interrupted by user")]
    Interrupted { operation: Operation },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for hirz operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach a path to an I/O error
    pub fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Convert a zip error raised while writing `archive`
    pub fn from_zip_write(archive: &Path, err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => Error::fs(archive, source),
            other => Error::Backup {
                archive: archive.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    /// Convert a zip error raised while reading `archive`
    pub fn from_zip_read(archive: &Path, err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => Error::fs(archive, source),
            other => Error::CorruptArchive {
                archive: archive.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FileSystem { .. } => ErrorCategory::FileSystem,
            Error::Backup { .. } => ErrorCategory::BackupOperation,
            Error::CorruptArchive { .. } => ErrorCategory::RestoreOperation,
            Error::Interrupted { operation } => match operation {
                Operation::Backup => ErrorCategory::BackupOperation,
                Operation::Restore => ErrorCategory::RestoreOperation,
            },
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Config(_) | Error::Json(_) => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::FileSystem { source, .. } => classify_io(source).0,
            Error::Backup { .. } => ErrorSeverity::Medium,
            Error::CorruptArchive { .. } => ErrorSeverity::High,
            Error::Interrupted { .. } => ErrorSeverity::Low,
            Error::Validation { .. } | Error::Config(_) | Error::Json(_) => ErrorSeverity::High,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::FileSystem { source, .. } => classify_io(source).1,
            Error::CorruptArchive { .. } | Error::Validation { .. } => false,
            _ => true,
        }
    }

    /// True when the user asked the operation to stop
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted { .. })
    }

    /// Free-form context for logs
    pub fn context(&self) -> Vec<(&'static str, String)> {
        match self {
            Error::FileSystem { path, source } => vec![
                ("path", path.display().to_string()),
                ("kind", format!("{:?}", source.kind())),
            ],
            Error::Backup { archive, .. } | Error::CorruptArchive { archive, .. } => {
                vec![("archive", archive.display().to_string())]
            }
            Error::Interrupted { operation } => vec![("operation", operation.to_string())],
            Error::Validation { field, .. } => vec![("field", field.clone())],
            Error::Config(_) | Error::Json(_) => Vec::new(),
        }
    }
}

/// Classify a raw OS error into a severity and whether it is worth retrying.
pub fn classify_io(err: &io::Error) -> (ErrorSeverity, bool) {
    if err
        .raw_os_error()
        .is_some_and(|code| OUT_OF_SPACE_CODES.contains(&code))
    {
        return (ErrorSeverity::Critical, false);
    }
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => (ErrorSeverity::High, true),
        _ => (ErrorSeverity::Medium, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(classify_io(&not_found), (ErrorSeverity::High, true));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_io(&denied), (ErrorSeverity::High, true));

        let other = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(classify_io(&other), (ErrorSeverity::Medium, true));
    }

    #[cfg(unix)]
    #[test]
    fn test_out_of_space_is_critical() {
        let full = io::Error::from_raw_os_error(28);
        assert_eq!(classify_io(&full), (ErrorSeverity::Critical, false));

        let err = Error::fs("/tmp/x.zip", full);
        assert_eq!(err.category(), ErrorCategory::FileSystem);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_interruption_is_low_and_recoverable() {
        let err = Error::Interrupted {
            operation: Operation::Restore,
        };
        assert!(err.is_interrupted());
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::RestoreOperation);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_zip_io_errors_become_file_system_errors() {
        let archive = Path::new("backup.zip");
        let err = Error::from_zip_read(
            archive,
            zip::result::ZipError::Io(io::Error::from(io::ErrorKind::NotFound)),
        );
        assert_eq!(err.category(), ErrorCategory::FileSystem);

        let err = Error::from_zip_read(archive, zip::result::ZipError::FileNotFound);
        assert_eq!(err.category(), ErrorCategory::RestoreOperation);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_validation_context() {
        let err = Error::validation("retention", "must be between 1 and 100");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.context(), vec![("field", "retention".to_string())]);
        assert_eq!(err.to_string(), "Invalid retention: must be between 1 and 100");
    }
}
