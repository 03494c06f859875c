//! # transfer-core
//!
//! In-flight transfer tracking and a retrying fetch-then-move executor.
//!
//! ## Features
//!
//! - [`TransferRegistry`]: process-wide set of in-flight transfers, keyed by
//!   remote id and unique by file name. Check-and-insert is a single
//!   critical section.
//! - [`TransferExecutor`]: conflict check, fetch with bounded linear backoff,
//!   progress into the record, move into the destination directory.
//! - Progress is published on a `watch` channel; [`Throttle`] spaces out
//!   consumers that edit a chat message.
//! - Fetching and the filesystem sit behind one-method traits
//!   ([`FetchFile`], [`ExistsFile`], [`MoveFile`], [`SetPermissions`]) so the
//!   executor runs against in-memory doubles in tests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use transfer_core::{progress, SystemFs, TransferExecutor, TransferRegistry, TransferRequest};
//! # use transfer_core::{FetchFile, TransferError};
//! # async fn run(fetcher: impl FetchFile) -> Result<(), TransferError> {
//! let registry = TransferRegistry::new();
//! let executor = TransferExecutor::new(registry, fetcher, SystemFs, "/srv/downloads");
//! let request = TransferRequest {
//!     remote_id: "BQACAgIAAxkBAAIB".into(),
//!     file_name: "movie.mkv".into(),
//!     declared_size: 1_500_000_000,
//!     mime_type: Some("video/x-matroska".into()),
//! };
//! let (tx, _rx) = progress::channel();
//! let outcome = executor.execute(&request, tx).await?;
//! println!("saved to {}", outcome.final_path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod fs;
pub mod progress;
pub mod record;
pub mod registry;
pub mod retry;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use error::{Conflict, FetchError, FetchErrorKind, TransferError};
pub use executor::{TransferExecutor, TransferOutcome, TransferRequest};
pub use fs::{ExistsFile, MoveFile, SetPermissions, SystemFs, FILE_MODE};
pub use progress::{Progress, ProgressEvent, ProgressReceiver, ProgressSender, Throttle};
pub use record::{estimate_completion, progress_percent, TransferRecord, TransferStatus};
pub use registry::{TransferRegistration, TransferRegistry};
pub use retry::{RetryPolicy, INITIAL_RETRY_DELAY, MAX_RETRIES};
pub use traits::FetchFile;
