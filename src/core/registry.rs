//! The lock registry: one record per observed user lock.
//!
//! The registry is an ordered map from [`LockKey`] to [`LockRecord`],
//! guarded by a single mutex owned by the global verifier. Records own all
//! per-lock state: the kind and recursiveness, the saturating acquisition
//! counter, the predecessor set that encodes the lock-order graph, the
//! holder ledger, and the scratch color used by cycle searches.
//!
//! Records are created on the first observed interaction with a key, which
//! may be an explicit init hook or the first lock/unlock on a lock that was
//! statically initialized. They are removed only by an explicit destroy.

use crate::core::sorted_set::SortedSet;
use crate::core::types::{LockKey, LockKind};
use std::collections::BTreeMap;

/// One entry in a lock's holder ledger: who holds it, and from where.
#[derive(Debug, Clone)]
pub struct HolderEntry {
    /// Name of the holding thread at acquisition time.
    pub thread: String,
    /// Symbolic frames captured at acquisition time.
    pub frames: Vec<String>,
}

/// The verifier's persistent state for one user lock.
#[derive(Debug)]
pub struct LockRecord {
    key: LockKey,
    kind: LockKind,
    recursive: bool,
    /// Number of successful acquisitions, saturating.
    acquire_count: u64,
    /// Keys of locks that were held when this lock was acquired: the
    /// established order is "predecessor before this lock".
    predecessors: SortedSet<LockKey>,
    /// Current holders, most recent last. Removal takes the most recent
    /// entry for a thread first, which pairs the inner acquire of a
    /// recursive lock with the inner release.
    holders: Vec<HolderEntry>,
    /// Scratch for graph traversal; meaningful only against the registry's
    /// current color.
    color: u64,
    /// Set once the first sleeper-while-spinning warning for this lock has
    /// been emitted.
    spin_warned: bool,
}

impl LockRecord {
    fn new(key: LockKey, kind: LockKind, recursive: bool) -> LockRecord {
        LockRecord {
            key,
            kind,
            recursive,
            acquire_count: 0,
            predecessors: SortedSet::new(),
            holders: Vec::new(),
            color: 0,
            spin_warned: false,
        }
    }

    #[allow(dead_code)]
    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    #[allow(dead_code)]
    pub fn acquire_count(&self) -> u64 {
        self.acquire_count
    }

    pub fn note_acquired(&mut self) {
        self.acquire_count = self.acquire_count.saturating_add(1);
    }

    pub fn predecessors(&self) -> &SortedSet<LockKey> {
        &self.predecessors
    }

    pub(crate) fn predecessors_mut(&mut self) -> &mut SortedSet<LockKey> {
        &mut self.predecessors
    }

    pub(crate) fn color(&self) -> u64 {
        self.color
    }

    pub(crate) fn set_color(&mut self, color: u64) {
        self.color = color;
    }

    /// Whether the one-shot sleeper-while-spinning warning has fired, and
    /// arm it if not.
    pub fn arm_spin_warning(&mut self) -> bool {
        if self.spin_warned {
            false
        } else {
            self.spin_warned = true;
            true
        }
    }

    pub fn holders(&self) -> &[HolderEntry] {
        &self.holders
    }

    pub fn add_holder(&mut self, entry: HolderEntry) {
        self.holders.push(entry);
    }

    /// Remove the most recent holder entry attributed to `thread`.
    ///
    /// # Returns
    /// `true` if an entry was removed, `false` if `thread` is not among the
    /// holders.
    pub fn remove_holder(&mut self, thread: &str) -> bool {
        match self.holders.iter().rposition(|h| h.thread == thread) {
            Some(pos) => {
                self.holders.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Whether any holder entry is attributed to `thread`.
    #[allow(dead_code)]
    pub fn held_by(&self, thread: &str) -> bool {
        self.holders.iter().any(|h| h.thread == thread)
    }
}

/// Ordered map of every lock the verifier has seen, plus the traversal
/// color counter shared by all cycle searches.
///
/// Mutated only under the verifier's registry lock, which linearizes all
/// graph updates.
#[derive(Debug, Default)]
pub struct Registry {
    locks: BTreeMap<LockKey, LockRecord>,
    color: u64,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            locks: BTreeMap::new(),
            color: 0,
        }
    }

    /// Look up the record for `key`, creating it if this is the first
    /// interaction with the lock.
    ///
    /// # Returns
    /// The record and whether it was created by this call. An existing
    /// record keeps its original kind and recursiveness; the arguments only
    /// seed a new one.
    pub fn find_or_insert(
        &mut self,
        key: LockKey,
        kind: LockKind,
        recursive: bool,
    ) -> (&mut LockRecord, bool) {
        let mut created = false;
        let record = self.locks.entry(key).or_insert_with(|| {
            created = true;
            LockRecord::new(key, kind, recursive)
        });
        (record, created)
    }

    pub fn find(&self, key: LockKey) -> Option<&LockRecord> {
        self.locks.get(&key)
    }

    pub fn find_mut(&mut self, key: LockKey) -> Option<&mut LockRecord> {
        self.locks.get_mut(&key)
    }

    pub fn contains(&self, key: LockKey) -> bool {
        self.locks.contains_key(&key)
    }

    /// Remove `key` from the registry and purge it from every remaining
    /// record's predecessor set. Callers must have established that the
    /// record has no holders.
    pub fn remove(&mut self, key: LockKey) -> Option<LockRecord> {
        let record = self.locks.remove(&key)?;
        for other in self.locks.values_mut() {
            other.predecessors.remove(key);
        }
        Some(record)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub(crate) fn next_color(&mut self) -> u64 {
        self.color = self.color.wrapping_add(1);
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(thread: &str) -> HolderEntry {
        HolderEntry {
            thread: thread.to_owned(),
            frames: Vec::new(),
        }
    }

    #[test]
    fn find_or_insert_creates_once() {
        let mut reg = Registry::new();
        let (_, created) = reg.find_or_insert(1, LockKind::Sleeper, false);
        assert!(created);
        let (rec, created) = reg.find_or_insert(1, LockKind::Spin, true);
        assert!(!created);
        // The original kind and recursiveness win.
        assert_eq!(rec.kind(), LockKind::Sleeper);
        assert!(!rec.recursive());
    }

    #[test]
    fn remove_purges_predecessors_everywhere() {
        let mut reg = Registry::new();
        reg.find_or_insert(1, LockKind::Sleeper, false);
        reg.find_or_insert(2, LockKind::Sleeper, false);
        reg.find_or_insert(3, LockKind::Sleeper, false);
        reg.find_mut(2).unwrap().predecessors_mut().insert(1).unwrap();
        reg.find_mut(3).unwrap().predecessors_mut().insert(1).unwrap();
        reg.find_mut(3).unwrap().predecessors_mut().insert(2).unwrap();

        assert!(reg.remove(1).is_some());
        assert!(!reg.find(2).unwrap().predecessors().contains(1));
        assert!(!reg.find(3).unwrap().predecessors().contains(1));
        assert!(reg.find(3).unwrap().predecessors().contains(2));
    }

    #[test]
    fn holder_removal_is_lifo_per_thread() {
        let mut reg = Registry::new();
        let (rec, _) = reg.find_or_insert(1, LockKind::Sleeper, true);
        rec.add_holder(HolderEntry {
            thread: "a".to_owned(),
            frames: vec!["outer".to_owned()],
        });
        rec.add_holder(holder("b"));
        rec.add_holder(HolderEntry {
            thread: "a".to_owned(),
            frames: vec!["inner".to_owned()],
        });

        assert!(rec.remove_holder("a"));
        // The inner (most recent) entry for "a" went first.
        assert_eq!(rec.holders().len(), 2);
        assert_eq!(rec.holders()[0].frames, vec!["outer".to_owned()]);
        assert!(rec.remove_holder("a"));
        assert!(!rec.remove_holder("a"));
        assert!(rec.held_by("b"));
    }

    #[test]
    fn acquire_count_saturates() {
        let mut rec = LockRecord::new(1, LockKind::Spin, false);
        rec.acquire_count = u64::MAX;
        rec.note_acquired();
        assert_eq!(rec.acquire_count(), u64::MAX);
    }

    #[test]
    fn spin_warning_fires_once() {
        let mut rec = LockRecord::new(1, LockKind::Sleeper, false);
        assert!(rec.arm_spin_warning());
        assert!(!rec.arm_spin_warning());
    }
}
