//! Drives one confirmed transfer end to end.
//!
//! Steps, strictly in order:
//!
//! 1. conflict check and registration (one critical section)
//! 2. fetch with bounded linear-backoff retry, progress into the record
//! 3. mark downloaded and leave the registry, success or failure
//! 4. move into the destination directory, normalize permissions
//!
//! The registry only tracks the fetch phase. A failed move therefore leaves
//! no trace in status listings.

#[cfg(test)]
#[path = "executor_tests.rs"]
mod executor_tests;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Conflict, FetchError, TransferError};
use crate::fs::{ExistsFile, MoveFile, SetPermissions, FILE_MODE};
use crate::progress::{Progress, ProgressSender};
use crate::record::TransferRecord;
use crate::registry::{TransferRegistration, TransferRegistry};
use crate::retry::RetryPolicy;
use crate::traits::FetchFile;

/// A confirmed request to fetch one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub remote_id: String,
    pub file_name: String,
    pub declared_size: u64,
    pub mime_type: Option<String>,
}

/// Result of a fully successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub file_name: String,
    pub final_path: PathBuf,
    pub file_size: u64,
    pub retry_count: u32,
    pub download_duration: Duration,
    pub move_duration: Duration,
    pub total_duration: Duration,
}

pub struct TransferExecutor<F, S> {
    registry: TransferRegistry,
    fetcher: F,
    storage: S,
    destination_dir: PathBuf,
    retry: RetryPolicy,
}

impl<F, S> TransferExecutor<F, S>
where
    F: FetchFile,
    S: ExistsFile + MoveFile + SetPermissions + Send + Sync,
{
    pub fn new(
        registry: TransferRegistry,
        fetcher: F,
        storage: S,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            storage,
            destination_dir: destination_dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Early check used when a document first arrives, before the user
    /// confirms. [`execute`](Self::execute) checks again atomically.
    pub fn check(&self, remote_id: &str, file_name: &str) -> Result<(), Conflict> {
        self.registry
            .conflict_check(remote_id, file_name, &self.destination_dir, &self.storage)
    }

    #[instrument(
        name = "transfer",
        skip_all,
        fields(
            remote_id = %request.remote_id,
            file_name = %request.file_name,
            size = request.declared_size
        )
    )]
    pub async fn execute(
        &self,
        request: &TransferRequest,
        updates: ProgressSender,
    ) -> Result<TransferOutcome, TransferError> {
        let record = TransferRecord::new(
            &request.remote_id,
            &request.file_name,
            request.declared_size,
        );
        let mut registration = self
            .registry
            .claim(record, &self.destination_dir, &self.storage)
            .inspect_err(|conflict| warn!(%conflict, "transfer rejected"))?;
        info!("transfer registered");

        let progress = Progress::new(self.registry.clone(), &request.remote_id, updates);
        let started = Instant::now();

        let fetched = self.fetch_with_retry(request, &mut registration, &progress).await;
        let temp_path = match fetched {
            Ok(path) => path,
            Err(failure) => {
                let record = registration.release();
                return Err(self.fetch_failure(request, &record, started.elapsed(), failure));
            }
        };

        registration.update(|record| record.mark_downloaded());
        let mut record = registration.release();
        progress.publish(&record);
        info!(
            temp_path = %temp_path.display(),
            retry_count = record.retry_count,
            "download complete"
        );

        let final_path = match self
            .storage
            .move_file(&temp_path, &self.destination_dir, &request.file_name)
            .await
        {
            Ok(path) => path,
            Err(cause) => {
                let destination_path = self.destination_dir.join(&request.file_name);
                error!(
                    source = %temp_path.display(),
                    destination = %destination_path.display(),
                    error = %cause,
                    "move failed"
                );
                return Err(TransferError::MoveFailed {
                    file_name: request.file_name.clone(),
                    source_path: temp_path,
                    destination_path,
                    cause,
                });
            }
        };
        record.mark_moved();
        progress.publish(&record);

        if let Err(e) = self.storage.set_mode(&final_path, FILE_MODE).await {
            warn!(path = %final_path.display(), error = %e, "failed to set file permissions");
        }

        let outcome = TransferOutcome {
            file_name: request.file_name.clone(),
            final_path,
            file_size: record.total_bytes.max(record.received_bytes),
            retry_count: record.retry_count,
            download_duration: record.download_duration().unwrap_or_default(),
            move_duration: record.move_duration().unwrap_or_default(),
            total_duration: record.total_duration().unwrap_or_default(),
        };
        info!(
            final_path = %outcome.final_path.display(),
            total_secs = outcome.total_duration.as_secs_f64(),
            "transfer complete"
        );
        Ok(outcome)
    }

    async fn fetch_with_retry(
        &self,
        request: &TransferRequest,
        registration: &mut TransferRegistration,
        progress: &Progress,
    ) -> Result<PathBuf, FetchFailure> {
        let mut last_error = None;

        for attempt in self.retry.attempts() {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_secs = delay.as_secs_f64(), "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            registration.update(|record| record.retry_count = attempt);
            progress.refresh();
            info!(
                attempt = attempt + 1,
                max_attempts = self.retry.max_attempts,
                "downloading file"
            );

            match self.fetcher.fetch(request, progress).await {
                Ok(path) => return Ok(path),
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt + 1, error = %e, "transient fetch failure");
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(attempt = attempt + 1, error = %e, "fetch failed, not retrying");
                    return Err(FetchFailure::Permanent(e));
                }
            }
        }

        Err(FetchFailure::Exhausted(last_error))
    }

    fn fetch_failure(
        &self,
        request: &TransferRequest,
        record: &TransferRecord,
        elapsed: Duration,
        failure: FetchFailure,
    ) -> TransferError {
        match failure {
            FetchFailure::Permanent(e) => TransferError::NonTransientFetchError {
                file_name: request.file_name.clone(),
                file_size: record.total_bytes,
                retry_count: record.retry_count,
                elapsed,
                cause: e.message,
            },
            FetchFailure::Exhausted(last) => {
                error!(attempts = self.retry.attempts().len(), "max retries reached");
                TransferError::MaxRetriesExceeded {
                    file_name: request.file_name.clone(),
                    file_size: record.total_bytes,
                    attempts: self.retry.attempts().len() as u32,
                    retry_count: record.retry_count,
                    elapsed,
                    last_error: last.map(|e| e.to_string()).unwrap_or_default(),
                }
            }
        }
    }
}

enum FetchFailure {
    Permanent(FetchError),
    Exhausted(Option<FetchError>),
}
