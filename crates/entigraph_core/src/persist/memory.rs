//! In-memory persister.

use super::record::{scan_log, write_records, write_sealed, LOG_MAGIC};
use super::{ChangeSet, Persister, Snapshot};
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Keeps the log in a byte buffer.
///
/// Uses the same framing as the file persister, so its image can be
/// inspected or handed to a fresh persister to simulate a reopen. A
/// failure can be injected to exercise rollback.
#[derive(Debug)]
pub struct MemoryPersister {
    log: Mutex<Vec<u8>>,
    batches: AtomicU64,
    fail_next: AtomicBool,
}

impl MemoryPersister {
    /// Creates an empty persister.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            batches: AtomicU64::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Creates a persister over an existing log image.
    ///
    /// # Errors
    ///
    /// `Persistence` if `bytes` is not a log.
    pub fn from_bytes(bytes: Vec<u8>) -> CoreResult<Self> {
        let scan = scan_log(&bytes)?;
        let mut bytes = bytes;
        bytes.truncate(usize::try_from(scan.committed_len).unwrap_or(bytes.len()));
        Ok(Self {
            log: Mutex::new(bytes),
            batches: AtomicU64::new(scan.batches),
            fail_next: AtomicBool::new(false),
        })
    }

    /// Makes the next `persist` or `checkpoint` call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// A copy of the log image.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.log.lock().clone()
    }

    fn injected_failure(&self) -> CoreResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CoreError::persistence("injected failure"));
        }
        Ok(())
    }
}

impl Default for MemoryPersister {
    fn default() -> Self {
        Self::new()
    }
}

impl Persister for MemoryPersister {
    fn persist(&self, changes: &ChangeSet) -> CoreResult<()> {
        self.injected_failure()?;
        let batch = self.batches.load(Ordering::SeqCst) + 1;
        let mut encoded = Vec::new();
        write_records(&changes.to_records(batch), &mut encoded)?;

        let mut log = self.log.lock();
        if log.is_empty() {
            log.extend_from_slice(&LOG_MAGIC);
        }
        log.extend_from_slice(&encoded);
        self.batches.store(batch, Ordering::SeqCst);
        debug!(batch, bytes = encoded.len(), "persisted batch in memory");
        Ok(())
    }

    fn load(&self) -> CoreResult<Option<Snapshot>> {
        let log = self.log.lock();
        if log.is_empty() {
            return Ok(None);
        }
        let scan = scan_log(&log)?;
        Ok(Some(Snapshot::replay(scan.records)))
    }

    fn checkpoint(&self, full: &ChangeSet) -> CoreResult<()> {
        self.injected_failure()?;
        let batch = self.batches.load(Ordering::SeqCst).max(1);
        let mut image = LOG_MAGIC.to_vec();
        write_sealed(&full.to_records(batch), &mut image)?;
        *self.log.lock() = image;
        self.batches.store(batch, Ordering::SeqCst);
        Ok(())
    }

    fn batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Handle, Object};
    use crate::types::TypeName;

    fn changes(id: i64) -> ChangeSet {
        let handle = Handle::new(u32::try_from(id).unwrap(), 0);
        ChangeSet {
            written: vec![(handle, Object::new("Account").with("id", id))],
            admitted: vec![(TypeName::new("Account"), handle)],
            ..ChangeSet::default()
        }
    }

    #[test]
    fn fresh_persister_has_nothing_to_load() {
        assert!(MemoryPersister::new().load().unwrap().is_none());
    }

    #[test]
    fn batches_are_counted_and_replayed() {
        let persister = MemoryPersister::new();
        persister.persist(&changes(0)).unwrap();
        persister.persist(&changes(1)).unwrap();
        assert_eq!(persister.batches(), 2);

        let snapshot = persister.load().unwrap().unwrap();
        assert_eq!(snapshot.batches, 2);
        assert_eq!(snapshot.heap.len(), 2);
    }

    #[test]
    fn injected_failure_fires_once() {
        let persister = MemoryPersister::new();
        persister.fail_next();
        assert!(persister.persist(&changes(0)).is_err());
        assert!(persister.bytes().is_empty());
        assert!(persister.persist(&changes(0)).is_ok());
        assert_eq!(persister.batches(), 1);
    }

    #[test]
    fn image_can_be_reopened() {
        let persister = MemoryPersister::new();
        persister.persist(&changes(0)).unwrap();
        let mut image = persister.bytes();
        image.extend_from_slice(&[1, 2, 3]);

        let reopened = MemoryPersister::from_bytes(image).unwrap();
        assert_eq!(reopened.batches(), 1);
        assert_eq!(reopened.bytes(), persister.bytes());
    }

    #[test]
    fn checkpoint_replaces_the_log() {
        let persister = MemoryPersister::new();
        persister.persist(&changes(0)).unwrap();
        persister.persist(&changes(1)).unwrap();
        let before = persister.bytes().len();

        persister.checkpoint(&changes(1)).unwrap();
        assert!(persister.bytes().len() < before);
        let snapshot = persister.load().unwrap().unwrap();
        assert_eq!(snapshot.heap.len(), 1);
        assert_eq!(snapshot.batches, 2);
    }
}
