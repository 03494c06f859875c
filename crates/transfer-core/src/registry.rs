//! Process-wide table of transfers currently fetching.
//!
//! A single mutex guards the whole table. The conflict check and the insert
//! run under the same lock acquisition ([`TransferRegistry::claim`]), so two
//! near-simultaneous confirmations for the same file cannot both pass.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::Conflict;
use crate::fs::ExistsFile;
use crate::record::TransferRecord;

/// Shared handle; clones refer to the same table.
#[derive(Debug, Clone, Default)]
pub struct TransferRegistry {
    // Vec keeps insertion order for status listings; the table stays small.
    records: Arc<Mutex<Vec<TransferRecord>>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransferRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails if `destination_dir/file_name` exists, if `remote_id` is in
    /// flight, or if another in-flight transfer targets `file_name`.
    pub fn conflict_check<E: ExistsFile + ?Sized>(
        &self,
        remote_id: &str,
        file_name: &str,
        destination_dir: &Path,
        fs: &E,
    ) -> Result<(), Conflict> {
        let records = self.lock();
        check_on_disk(file_name, destination_dir, fs)?;
        check_in_flight(&records, remote_id, file_name)
    }

    /// Insert `record`. Rejects a duplicate `remote_id` or `file_name`.
    pub fn register(&self, record: TransferRecord) -> Result<(), Conflict> {
        let mut records = self.lock();
        check_in_flight(&records, &record.remote_id, &record.file_name)?;
        debug!(remote_id = %record.remote_id, file_name = %record.file_name, "registered transfer");
        records.push(record);
        Ok(())
    }

    /// Conflict check and insert as one critical section.
    ///
    /// The returned [`TransferRegistration`] removes the record when
    /// released or dropped.
    ///
    /// The on-disk check is a blocking `stat` made while the lock is held,
    /// on the caller's thread. It runs once per confirmed transfer.
    pub fn claim<E: ExistsFile + ?Sized>(
        &self,
        record: TransferRecord,
        destination_dir: &Path,
        fs: &E,
    ) -> Result<TransferRegistration, Conflict> {
        let mut records = self.lock();
        check_on_disk(&record.file_name, destination_dir, fs)?;
        check_in_flight(&records, &record.remote_id, &record.file_name)?;

        debug!(remote_id = %record.remote_id, file_name = %record.file_name, "claimed transfer");
        let registration = TransferRegistration {
            registry: self.clone(),
            remote_id: record.remote_id.clone(),
            last_known: record.clone(),
            released: false,
        };
        records.push(record);
        Ok(registration)
    }

    /// Remove and return the record for `remote_id`. Absent ids are a no-op.
    pub fn unregister(&self, remote_id: &str) -> Option<TransferRecord> {
        let mut records = self.lock();
        let index = records.iter().position(|r| r.remote_id == remote_id)?;
        debug!(remote_id, "unregistered transfer");
        Some(records.remove(index))
    }

    /// Mutate a record in place under the registry lock.
    pub fn update<R>(
        &self,
        remote_id: &str,
        f: impl FnOnce(&mut TransferRecord) -> R,
    ) -> Option<R> {
        let mut records = self.lock();
        records.iter_mut().find(|r| r.remote_id == remote_id).map(f)
    }

    pub fn get(&self, remote_id: &str) -> Option<TransferRecord> {
        self.lock().iter().find(|r| r.remote_id == remote_id).cloned()
    }

    /// Copy of every in-flight record, in insertion order.
    pub fn snapshot(&self) -> Vec<TransferRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn check_on_disk<E: ExistsFile + ?Sized>(
    file_name: &str,
    destination_dir: &Path,
    fs: &E,
) -> Result<(), Conflict> {
    if fs.exists(&destination_dir.join(file_name)) {
        return Err(Conflict::AlreadyExists {
            file_name: file_name.to_string(),
        });
    }
    Ok(())
}

fn check_in_flight(
    records: &[TransferRecord],
    remote_id: &str,
    file_name: &str,
) -> Result<(), Conflict> {
    let busy = records
        .iter()
        .any(|r| r.remote_id == remote_id || r.file_name == file_name);
    if busy {
        return Err(Conflict::AlreadyDownloading {
            file_name: file_name.to_string(),
        });
    }
    Ok(())
}

/// Ownership of one registry entry for the duration of a fetch.
///
/// Removes the entry exactly once: on [`release`](Self::release), or on
/// drop if never released.
#[derive(Debug)]
pub struct TransferRegistration {
    registry: TransferRegistry,
    remote_id: String,
    last_known: TransferRecord,
    released: bool,
}

impl TransferRegistration {
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut TransferRecord) -> R) -> Option<R> {
        let registry = self.registry.clone();
        registry.update(&self.remote_id, |record| {
            let out = f(record);
            self.last_known = record.clone();
            out
        })
    }

    /// Remove the entry and hand back its final state.
    pub fn release(mut self) -> TransferRecord {
        self.released = true;
        match self.registry.unregister(&self.remote_id) {
            Some(record) => record,
            None => self.last_known.clone(),
        }
    }
}

impl Drop for TransferRegistration {
    fn drop(&mut self) {
        if !self.released {
            self.registry.unregister(&self.remote_id);
        }
    }
}
