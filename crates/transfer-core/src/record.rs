//! One in-flight transfer and its lifecycle timestamps.

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Derived lifecycle phase of a [`TransferRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Downloading,
    Moving,
    Complete,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downloading => write!(f, "Downloading"),
            Self::Moving => write!(f, "Moving"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress as a percentage, `0.0` while the total is unknown.
pub fn progress_percent(received_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    received_bytes as f64 / total_bytes as f64 * 100.0
}

/// State of a single transfer, keyed by `remote_id` in the registry.
///
/// Durations use [`tokio::time::Instant`] so they follow a paused test
/// clock; `started_at` is wall-clock time for display only.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub remote_id: String,
    pub file_name: String,
    pub total_bytes: u64,
    pub received_bytes: u64,
    /// Zero-based index of the fetch attempt most recently started.
    pub retry_count: u32,
    pub started_at: DateTime<Local>,
    start: Instant,
    download_finished: Option<Instant>,
    move_finished: Option<Instant>,
}

impl TransferRecord {
    pub fn new(
        remote_id: impl Into<String>,
        file_name: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            file_name: file_name.into(),
            total_bytes,
            received_bytes: 0,
            retry_count: 0,
            started_at: Local::now(),
            start: Instant::now(),
            download_finished: None,
            move_finished: None,
        }
    }

    pub fn status(&self) -> TransferStatus {
        match (self.download_finished, self.move_finished) {
            (_, Some(_)) => TransferStatus::Complete,
            (Some(_), None) => TransferStatus::Moving,
            (None, None) => TransferStatus::Downloading,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.received_bytes, self.total_bytes)
    }

    /// Apply a `(received, total)` report from the transport.
    ///
    /// A nonzero `total` replaces the declared size. `received_bytes` never
    /// decreases and never exceeds a known total.
    pub fn record_progress(&mut self, received: u64, total: u64) {
        if total > 0 {
            self.total_bytes = total;
        }
        let mut received = received;
        if self.total_bytes > 0 {
            received = received.min(self.total_bytes);
        }
        self.received_bytes = self.received_bytes.max(received);
    }

    /// Returns `false` if the download was already marked finished.
    pub fn mark_downloaded(&mut self) -> bool {
        if self.download_finished.is_some() {
            return false;
        }
        self.download_finished = Some(Instant::now());
        true
    }

    /// Returns `false` if the download has not finished yet or the move
    /// was already marked finished.
    pub fn mark_moved(&mut self) -> bool {
        if self.download_finished.is_none() || self.move_finished.is_some() {
            return false;
        }
        self.move_finished = Some(Instant::now());
        true
    }

    /// Time since the record was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn download_duration(&self) -> Option<Duration> {
        self.download_finished.map(|t| t.duration_since(self.start))
    }

    pub fn move_duration(&self) -> Option<Duration> {
        match (self.download_finished, self.move_finished) {
            (Some(downloaded), Some(moved)) => Some(moved.duration_since(downloaded)),
            _ => None,
        }
    }

    pub fn total_duration(&self) -> Option<Duration> {
        self.move_finished.map(|t| t.duration_since(self.start))
    }

    /// Estimated wall-clock completion time from average throughput so far.
    pub fn eta(&self) -> Option<DateTime<Local>> {
        estimate_completion(self.received_bytes, self.total_bytes, self.elapsed())
    }
}

/// Projects the average throughput over `elapsed` onto the remaining bytes.
/// `None` until some bytes have arrived.
pub fn estimate_completion(
    received_bytes: u64,
    total_bytes: u64,
    elapsed: Duration,
) -> Option<DateTime<Local>> {
    let elapsed = elapsed.as_secs_f64();
    if received_bytes == 0 || elapsed <= 0.0 {
        return None;
    }
    let speed = received_bytes as f64 / elapsed;
    let remaining = total_bytes.saturating_sub(received_bytes) as f64;
    let remaining = Duration::try_from_secs_f64(remaining / speed).ok()?;
    Local::now().checked_add_signed(chrono::Duration::from_std(remaining).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_zero_total() {
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(500, 0), 0.0);
    }

    #[test]
    fn test_progress_percent_exact_completion() {
        assert_eq!(progress_percent(1024, 1024), 100.0);
        assert_eq!(progress_percent(512, 1024), 50.0);
    }

    #[test]
    fn test_progress_percent_monotonic() {
        let total = 7_777_777;
        let mut last = 0.0;
        for received in (0..=total).step_by(123_457).chain(std::iter::once(total)) {
            let pct = progress_percent(received, total);
            assert!(pct >= last, "{pct} < {last} at {received}");
            last = pct;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_new_record_is_downloading() {
        let record = TransferRecord::new("id-1", "movie.mkv", 2048);
        assert_eq!(record.status(), TransferStatus::Downloading);
        assert_eq!(record.received_bytes, 0);
        assert_eq!(record.retry_count, 0);
        assert!(record.download_duration().is_none());
        assert!(record.total_duration().is_none());
    }

    #[test]
    fn test_status_transitions() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 2048);

        assert!(record.mark_downloaded());
        assert_eq!(record.status(), TransferStatus::Moving);
        assert!(record.download_duration().is_some());
        assert!(record.move_duration().is_none());

        assert!(record.mark_moved());
        assert_eq!(record.status(), TransferStatus::Complete);
        assert!(record.move_duration().is_some());
        assert!(record.total_duration().is_some());
    }

    #[test]
    fn test_move_cannot_precede_download() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 2048);
        assert!(!record.mark_moved());
        assert_eq!(record.status(), TransferStatus::Downloading);
    }

    #[test]
    fn test_timestamps_are_set_once() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 2048);
        assert!(record.mark_downloaded());
        assert!(!record.mark_downloaded());
        assert!(record.mark_moved());
        assert!(!record.mark_moved());
        assert_eq!(record.status(), TransferStatus::Complete);
    }

    #[test]
    fn test_record_progress_clamps_and_never_decreases() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 1000);

        record.record_progress(400, 1000);
        assert_eq!(record.received_bytes, 400);

        record.record_progress(100, 1000);
        assert_eq!(record.received_bytes, 400);

        record.record_progress(1500, 1000);
        assert_eq!(record.received_bytes, 1000);
        assert_eq!(record.progress_percent(), 100.0);
    }

    #[test]
    fn test_record_progress_updates_total_when_reported() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 0);
        assert_eq!(record.progress_percent(), 0.0);

        record.record_progress(250, 1000);
        assert_eq!(record.total_bytes, 1000);
        assert_eq!(record.progress_percent(), 25.0);

        record.record_progress(500, 0);
        assert_eq!(record.total_bytes, 1000);
        assert_eq!(record.received_bytes, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_durations_follow_paused_clock() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 1000);

        tokio::time::advance(Duration::from_secs(30)).await;
        record.mark_downloaded();
        tokio::time::advance(Duration::from_secs(5)).await;
        record.mark_moved();

        assert_eq!(record.download_duration(), Some(Duration::from_secs(30)));
        assert_eq!(record.move_duration(), Some(Duration::from_secs(5)));
        assert_eq!(record.total_duration(), Some(Duration::from_secs(35)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_requires_progress() {
        let mut record = TransferRecord::new("id-1", "movie.mkv", 1000);
        assert!(record.eta().is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        record.record_progress(500, 1000);
        let eta = record.eta().expect("eta once bytes have arrived");
        assert!(eta > Local::now());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TransferStatus::Downloading.to_string(), "Downloading");
        assert_eq!(TransferStatus::Moving.to_string(), "Moving");
        assert_eq!(TransferStatus::Complete.to_string(), "Complete");
    }
}
