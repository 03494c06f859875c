//! Error taxonomy for transfers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A request that cannot proceed because the file is already on disk or
/// already in flight. User-correctable; never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Conflict {
    #[error("File already exists in downloads folder: {file_name}")]
    AlreadyExists { file_name: String },

    #[error("File is already being downloaded: {file_name}")]
    AlreadyDownloading { file_name: String },
}

impl Conflict {
    pub fn file_name(&self) -> &str {
        match self {
            Self::AlreadyExists { file_name } | Self::AlreadyDownloading { file_name } => file_name,
        }
    }
}

/// Whether a failed fetch is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Likely to succeed on retry (disconnect, timeout, flood control).
    Transient,
    /// Retrying will not help (invalid identifier, file too big).
    Permanent,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure reported by a [`FetchFile`](crate::FetchFile) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} fetch error: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// Everything that can end a transfer early. Each variant carries enough
/// detail to explain the failure to the requesting user.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("Max retries reached after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        file_name: String,
        file_size: u64,
        attempts: u32,
        retry_count: u32,
        elapsed: Duration,
        last_error: String,
    },

    #[error("Download failed: {cause}")]
    NonTransientFetchError {
        file_name: String,
        file_size: u64,
        retry_count: u32,
        elapsed: Duration,
        cause: String,
    },

    #[error("Failed to move {} to {}: {cause}", source_path.display(), destination_path.display())]
    MoveFailed {
        file_name: String,
        source_path: PathBuf,
        destination_path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

impl TransferError {
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.conflict().is_some()
    }

    /// Number of the last fetch attempt started, when the fetch phase was reached.
    pub fn retry_count(&self) -> Option<u32> {
        match self {
            Self::MaxRetriesExceeded { retry_count, .. }
            | Self::NonTransientFetchError { retry_count, .. } => Some(*retry_count),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_messages_name_the_file() {
        let exists = Conflict::AlreadyExists {
            file_name: "movie.mkv".to_string(),
        };
        let downloading = Conflict::AlreadyDownloading {
            file_name: "movie.mkv".to_string(),
        };

        assert_eq!(
            exists.to_string(),
            "File already exists in downloads folder: movie.mkv"
        );
        assert_eq!(
            downloading.to_string(),
            "File is already being downloaded: movie.mkv"
        );
        assert_eq!(exists.file_name(), "movie.mkv");
    }

    #[test]
    fn test_fetch_error_kind() {
        assert!(FetchError::transient("disconnect").is_transient());
        assert!(!FetchError::permanent("bad id").is_transient());
        assert_eq!(
            FetchError::permanent("bad id").to_string(),
            "permanent fetch error: bad id"
        );
    }

    #[test]
    fn test_conflict_converts_into_transfer_error() {
        let err: TransferError = Conflict::AlreadyDownloading {
            file_name: "a.mkv".to_string(),
        }
        .into();

        assert!(err.is_conflict());
        assert_eq!(err.retry_count(), None);
        assert_eq!(err.to_string(), "File is already being downloaded: a.mkv");
    }

    #[test]
    fn test_retry_count_exposed_for_fetch_failures() {
        let err = TransferError::MaxRetriesExceeded {
            file_name: "a.mkv".to_string(),
            file_size: 10,
            attempts: 5,
            retry_count: 4,
            elapsed: Duration::from_secs(50),
            last_error: "transient fetch error: reset".to_string(),
        };

        assert_eq!(err.retry_count(), Some(4));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_move_failed_reports_both_paths() {
        let err = TransferError::MoveFailed {
            file_name: "a.mkv".to_string(),
            source_path: PathBuf::from("/tmp/a.part"),
            destination_path: PathBuf::from("/media/a.mkv"),
            cause: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.part"));
        assert!(msg.contains("/media/a.mkv"));
        assert!(msg.contains("denied"));
    }
}
