//! Store statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//! Gauges (objects, members per type, persisted batches) are filled in
//! when a snapshot is taken.

use crate::types::TypeName;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters of one store.
#[derive(Debug, Default)]
pub struct StoreStats {
    saves: AtomicU64,
    objects_written: AtomicU64,
    reads: AtomicU64,
    index_lookups: AtomicU64,
    scans: AtomicU64,
    deletes: AtomicU64,
    conflicts: AtomicU64,
    rollbacks: AtomicU64,
    checkpoints: AtomicU64,
    collected: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_save(&self, objects: u64) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.objects_written.fetch_add(objects, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, members: u64) {
        self.deletes.fetch_add(members, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_collected(&self, objects: u64) {
        self.collected.fetch_add(objects, Ordering::Relaxed);
    }

    /// Returns the number of successful save calls.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Returns the number of storage objects written by saves.
    pub fn objects_written(&self) -> u64 {
        self.objects_written.load(Ordering::Relaxed)
    }

    /// Returns the number of working copies handed out.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of id lookups answered by an index.
    pub fn index_lookups(&self) -> u64 {
        self.index_lookups.load(Ordering::Relaxed)
    }

    /// Returns the number of id lookups that scanned a collection.
    ///
    /// High scan counts mean a collection has no id index.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the number of members removed.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of writes rejected by a version check.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of writes rolled back.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of checkpoints.
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::Relaxed)
    }

    /// Returns the number of objects freed by garbage collection.
    pub fn collected(&self) -> u64 {
        self.collected.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(
        &self,
        objects: u64,
        members: BTreeMap<TypeName, u64>,
        batches: u64,
    ) -> StatsSnapshot {
        StatsSnapshot {
            saves: self.saves(),
            objects_written: self.objects_written(),
            reads: self.reads(),
            index_lookups: self.index_lookups(),
            scans: self.scans(),
            deletes: self.deletes(),
            conflicts: self.conflicts(),
            rollbacks: self.rollbacks(),
            checkpoints: self.checkpoints(),
            collected: self.collected(),
            objects,
            members,
            batches,
        }
    }
}

/// A point-in-time copy of the store's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful save calls.
    pub saves: u64,
    /// Storage objects written by saves.
    pub objects_written: u64,
    /// Working copies handed out.
    pub reads: u64,
    /// Id lookups answered by an index.
    pub index_lookups: u64,
    /// Id lookups that scanned a collection.
    pub scans: u64,
    /// Members removed.
    pub deletes: u64,
    /// Writes rejected by a version check.
    pub conflicts: u64,
    /// Writes rolled back.
    pub rollbacks: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
    /// Objects freed by garbage collection.
    pub collected: u64,
    /// Live storage objects.
    pub objects: u64,
    /// Members per entity type.
    pub members: BTreeMap<TypeName, u64>,
    /// Batches persisted.
    pub batches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = StoreStats::new();
        assert_eq!(stats.saves(), 0);
        assert_eq!(stats.reads(), 0);
        assert_eq!(stats.rollbacks(), 0);
    }

    #[test]
    fn snapshot_carries_counters_and_gauges() {
        let stats = StoreStats::new();
        stats.record_save(3);
        stats.record_save(1);
        stats.record_scan();
        stats.record_conflict();

        let members = BTreeMap::from([(TypeName::new("Account"), 2)]);
        let snap = stats.snapshot(5, members.clone(), 7);
        assert_eq!(snap.saves, 2);
        assert_eq!(snap.objects_written, 4);
        assert_eq!(snap.scans, 1);
        assert_eq!(snap.conflicts, 1);
        assert_eq!(snap.objects, 5);
        assert_eq!(snap.members, members);
        assert_eq!(snap.batches, 7);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(StoreStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_read();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.reads(), 1000);
    }
}
