//! In-memory test doubles for the fetch and filesystem seams.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! transfer-core = { path = "...", features = ["test-support"] }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::FetchError;
use crate::executor::TransferRequest;
use crate::fs::{ExistsFile, MoveFile, SetPermissions};
use crate::progress::Progress;
use crate::traits::FetchFile;

// ── MockFetcher ───────────────────────────────────────────────────────────────

/// Scripted outcome of one fetch attempt.
#[derive(Debug, Clone)]
pub enum MockFetch {
    Ok(PathBuf),
    Transient(&'static str),
    Permanent(&'static str),
}

/// Replays a script of outcomes, one per attempt. Once the script runs out
/// every further attempt fails transiently.
#[derive(Clone, Default)]
pub struct MockFetcher {
    script: Arc<Mutex<VecDeque<MockFetch>>>,
    attempts: Arc<AtomicU32>,
    progress_steps: Arc<Vec<(u64, u64)>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl MockFetcher {
    pub fn new(script: impl IntoIterator<Item = MockFetch>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Succeeds on the first attempt.
    pub fn succeeding(path: impl Into<PathBuf>) -> Self {
        Self::new([MockFetch::Ok(path.into())])
    }

    /// Fails transiently `failures` times, then succeeds.
    pub fn flaky(failures: usize, path: impl Into<PathBuf>) -> Self {
        let script = std::iter::repeat(MockFetch::Transient("connection reset"))
            .take(failures)
            .chain(std::iter::once(MockFetch::Ok(path.into())));
        Self::new(script)
    }

    /// `(received, total)` reports issued during every attempt.
    pub fn with_progress(mut self, steps: impl IntoIterator<Item = (u64, u64)>) -> Self {
        self.progress_steps = Arc::new(steps.into_iter().collect());
        self
    }

    /// Block every attempt until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Resolves once an attempt has started (and is possibly gated).
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

impl FetchFile for MockFetcher {
    async fn fetch(
        &self,
        _request: &TransferRequest,
        progress: &Progress,
    ) -> Result<PathBuf, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        for (received, total) in self.progress_steps.iter() {
            progress.report(*received, *total);
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(MockFetch::Ok(path)) => Ok(path),
            Some(MockFetch::Permanent(msg)) => Err(FetchError::permanent(msg)),
            Some(MockFetch::Transient(msg)) => Err(FetchError::transient(msg)),
            None => Err(FetchError::transient("script exhausted")),
        }
    }
}

// ── MemFs ─────────────────────────────────────────────────────────────────────

/// Paths are stored as raw [`PathBuf`] keys with no normalization.
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<HashMap<PathBuf, u64>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
    modes: Arc<Mutex<HashMap<PathBuf, u32>>>,
    fail_moves: Arc<AtomicBool>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, size: u64) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), size);
    }

    /// Make every subsequent move fail with `PermissionDenied`.
    pub fn deny_moves(&self) {
        self.fail_moves.store(true, Ordering::SeqCst);
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.modes.lock().unwrap().get(path).copied()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

impl ExistsFile for MemFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dir_exists(path)
    }
}

impl MoveFile for MemFs {
    async fn move_file(
        &self,
        source: &Path,
        destination_dir: &Path,
        file_name: &str,
    ) -> io::Result<PathBuf> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "destination is not writable",
            ));
        }

        let mut files = self.files.lock().unwrap();
        let size = files
            .remove(source)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "source file not found"))?;
        self.dirs
            .lock()
            .unwrap()
            .insert(destination_dir.to_path_buf());
        let destination = destination_dir.join(file_name);
        files.insert(destination.clone(), size);
        Ok(destination)
    }
}

impl SetPermissions for MemFs {
    async fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        if !self.files.lock().unwrap().contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.modes.lock().unwrap().insert(path.to_path_buf(), mode);
        Ok(())
    }
}
