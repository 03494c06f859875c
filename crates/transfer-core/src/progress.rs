//! Progress reporting from the fetch primitive to status readers.
//!
//! The fetch side calls [`Progress::report`], which updates the registry
//! record under the registry lock and publishes the newest
//! [`ProgressEvent`] on a `watch` channel. `watch` keeps only the latest
//! value, so a slow consumer never holds up the fetch.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use chrono::{DateTime, Local};

use crate::record::{estimate_completion, progress_percent, TransferRecord, TransferStatus};
use crate::registry::TransferRegistry;

/// Default spacing between outbound status edits.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

pub type ProgressSender = watch::Sender<Option<ProgressEvent>>;
pub type ProgressReceiver = watch::Receiver<Option<ProgressEvent>>;

/// A fresh channel with no event published yet.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    watch::channel(None)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub remote_id: String,
    pub file_name: String,
    pub received_bytes: u64,
    pub total_bytes: u64,
    pub retry_count: u32,
    pub status: TransferStatus,
    pub elapsed: Duration,
}

impl ProgressEvent {
    pub fn from_record(record: &TransferRecord) -> Self {
        Self {
            remote_id: record.remote_id.clone(),
            file_name: record.file_name.clone(),
            received_bytes: record.received_bytes,
            total_bytes: record.total_bytes,
            retry_count: record.retry_count,
            status: record.status(),
            elapsed: record.elapsed(),
        }
    }

    pub fn percent(&self) -> f64 {
        progress_percent(self.received_bytes, self.total_bytes)
    }

    pub fn eta(&self) -> Option<DateTime<Local>> {
        estimate_completion(self.received_bytes, self.total_bytes, self.elapsed)
    }
}

/// Handle given to the fetch primitive for one transfer.
#[derive(Debug)]
pub struct Progress {
    registry: TransferRegistry,
    remote_id: String,
    updates: ProgressSender,
}

impl Progress {
    pub fn new(
        registry: TransferRegistry,
        remote_id: impl Into<String>,
        updates: ProgressSender,
    ) -> Self {
        Self {
            registry,
            remote_id: remote_id.into(),
            updates,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Record `(received, total)` bytes for the current attempt.
    pub fn report(&self, received: u64, total: u64) {
        let event = self.registry.update(&self.remote_id, |record| {
            record.record_progress(received, total);
            ProgressEvent::from_record(record)
        });
        if let Some(event) = event {
            self.updates.send_replace(Some(event));
        }
    }

    /// Publish the state of a record that may no longer be registered.
    pub(crate) fn publish(&self, record: &TransferRecord) {
        self.updates.send_replace(Some(ProgressEvent::from_record(record)));
    }

    /// Re-publish the registered record, e.g. after a new attempt starts.
    pub(crate) fn refresh(&self) {
        if let Some(record) = self.registry.get(&self.remote_id) {
            self.publish(&record);
        }
    }
}

/// Lets an event through at most once per `interval`. The first call
/// always passes.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Earliest instant at which [`ready`](Self::ready) can pass again.
    pub fn next_ready(&self) -> Option<Instant> {
        self.last.map(|last| last + self.interval)
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}
