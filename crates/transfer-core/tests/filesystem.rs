//! End-to-end transfers against the real filesystem.
//!
//! The fetcher writes a temp file under a `tempfile` directory and the
//! executor moves it with [`SystemFs`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use transfer_core::{
    progress, FetchError, FetchFile, Progress, RetryPolicy, SystemFs, TransferError,
    TransferExecutor, TransferRegistry, TransferRequest,
};

/// Writes `content` to `<temp_dir>/<file_name>.part`, failing the first
/// `failures` attempts.
struct WritingFetcher {
    temp_dir: PathBuf,
    content: Vec<u8>,
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl FetchFile for WritingFetcher {
    async fn fetch(
        &self,
        request: &TransferRequest,
        progress: &Progress,
    ) -> Result<PathBuf, FetchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(FetchError::transient("connection reset by peer"));
        }

        let path = self.temp_dir.join(format!("{}.part", request.file_name));
        tokio::fs::write(&path, &self.content)
            .await
            .map_err(|e| FetchError::transient(e.to_string()))?;
        let len = self.content.len() as u64;
        progress.report(len, len);
        Ok(path)
    }
}

fn request(file_name: &str) -> TransferRequest {
    TransferRequest {
        remote_id: format!("remote-{file_name}"),
        file_name: file_name.to_string(),
        declared_size: 11,
        mime_type: None,
    }
}

fn executor(temp: &Path, dest: &Path, failures: u32) -> TransferExecutor<WritingFetcher, SystemFs> {
    let fetcher = WritingFetcher {
        temp_dir: temp.to_path_buf(),
        content: b"hello world".to_vec(),
        failures,
        attempts: Arc::new(AtomicU32::new(0)),
    };
    TransferExecutor::new(TransferRegistry::new(), fetcher, SystemFs, dest)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
}

#[tokio::test]
async fn test_file_lands_in_destination() {
    let temp = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let target = dest.path().join("nested");
    let executor = executor(temp.path(), &target, 0);
    let (tx, _rx) = progress::channel();

    let outcome = executor.execute(&request("report.pdf"), tx).await.unwrap();

    assert_eq!(outcome.final_path, target.join("report.pdf"));
    assert_eq!(std::fs::read(&outcome.final_path).unwrap(), b"hello world");
    assert!(!temp.path().join("report.pdf.part").exists());
    assert_eq!(outcome.file_size, 11);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&outcome.final_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }
}

#[tokio::test]
async fn test_retries_then_lands() {
    let temp = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let executor = executor(temp.path(), dest.path(), 2);
    let (tx, _rx) = progress::channel();

    let outcome = executor.execute(&request("report.pdf"), tx).await.unwrap();

    assert_eq!(outcome.retry_count, 2);
    assert!(dest.path().join("report.pdf").exists());
}

#[tokio::test]
async fn test_existing_destination_file_is_not_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("report.pdf"), b"original").unwrap();
    let executor = executor(temp.path(), dest.path(), 0);
    let (tx, _rx) = progress::channel();

    let err = executor.execute(&request("report.pdf"), tx).await.unwrap_err();

    assert!(matches!(err, TransferError::Conflict(_)));
    assert_eq!(std::fs::read(dest.path().join("report.pdf")).unwrap(), b"original");
}

#[tokio::test]
async fn test_sequential_transfers_of_different_files() {
    let temp = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let executor = executor(temp.path(), dest.path(), 0);

    for name in ["a.bin", "b.bin", "c.bin"] {
        let (tx, _rx) = progress::channel();
        executor.execute(&request(name), tx).await.unwrap();
    }

    let mut names: Vec<_> = std::fs::read_dir(dest.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["a.bin", "b.bin", "c.bin"]);
    assert!(executor.registry().is_empty());
}
