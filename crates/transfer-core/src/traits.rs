use std::future::Future;
use std::path::PathBuf;

use crate::error::FetchError;
use crate::executor::TransferRequest;
use crate::progress::Progress;

/// Fetch a remote file's content to a local temporary path.
///
/// One trait, one operation. Implementations decide which failures are
/// [`Transient`](crate::FetchErrorKind::Transient), apply their own
/// per-attempt timeout, and clean up partial files they wrote.
pub trait FetchFile: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &TransferRequest,
        progress: &Progress,
    ) -> impl Future<Output = Result<PathBuf, FetchError>> + Send;
}
