//! Lock-order graph maintenance and cycle search.
//!
//! The graph is not a separate structure: edges live in each record's
//! predecessor set, keyed by [`LockKey`], and the registry owns all the
//! records. When a thread that holds H successfully starts acquiring L, the
//! established order "H before L" is recorded as an edge from L back to H.
//! An acquisition that would close a cycle is reported instead of recorded.
//!
//! Cycle search is an iterative depth-first walk over predecessor edges.
//! Each search takes a fresh color from the registry's counter and stamps
//! the nodes it visits, so visited checks are O(1) and no per-search state
//! has to be cleared afterwards. The color counter is only ever advanced
//! under the registry lock, so searches never interfere.

use crate::core::registry::Registry;
use crate::core::types::LockKey;

/// Outcome of processing one held lock during an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderViolation {
    /// The thread already holds the lock it is acquiring, and the lock is
    /// not recursive.
    SelfDeadlock,
    /// Acquiring the lock would create a cycle: the lock should have been
    /// taken before `held`, which the thread already holds.
    Inversion { held: LockKey },
    /// The edge could not be recorded because the predecessor set failed
    /// to grow.
    OutOfMemory { held: LockKey },
    /// The held stack names a lock the registry has never seen. The hooks
    /// create records on first touch, so this is an internal inconsistency.
    UnknownHeld { held: LockKey },
}

impl Registry {
    /// Record the ordering consequences of one acquisition attempt.
    ///
    /// For every key in `held` (in acquisition order): a recursive re-entry
    /// of `key` is allowed and skipped, a non-recursive re-entry is a
    /// self-deadlock, and any other held lock either reveals an inversion
    /// or becomes a predecessor of `key`. Each held lock is processed
    /// independently; a violation on one does not roll back edges already
    /// recorded for earlier ones.
    ///
    /// The record for `key` must already exist.
    pub fn update_order(&mut self, held: &[LockKey], key: LockKey) -> Vec<OrderViolation> {
        let mut violations = Vec::new();
        let recursive = self
            .find(key)
            .map(|record| record.recursive())
            .unwrap_or(false);

        for &h in held {
            if h == key {
                if !recursive {
                    violations.push(OrderViolation::SelfDeadlock);
                }
                continue;
            }
            if !self.contains(h) {
                violations.push(OrderViolation::UnknownHeld { held: h });
                continue;
            }
            if self.path_exists(h, key) {
                violations.push(OrderViolation::Inversion { held: h });
                continue;
            }
            let inserted = match self.find_mut(key) {
                Some(record) => record.predecessors_mut().insert(h),
                None => continue,
            };
            if inserted.is_err() {
                violations.push(OrderViolation::OutOfMemory { held: h });
            }
        }
        violations
    }

    /// Whether `target` is reachable from `from` along predecessor edges.
    ///
    /// Reaching `target` means the order "target before from" is already
    /// established, so recording "from before target" would close a cycle.
    pub(crate) fn path_exists(&mut self, from: LockKey, target: LockKey) -> bool {
        let color = self.next_color();
        let mut stack = vec![from];
        while let Some(key) = stack.pop() {
            if key == target {
                return true;
            }
            let Some(record) = self.find_mut(key) else {
                // A predecessor that was never registered or has been
                // destroyed; nothing to follow.
                continue;
            };
            if record.color() == color {
                continue;
            }
            record.set_color(color);
            stack.extend(record.predecessors().iter().copied());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LockKind;

    fn registry_with(keys: &[LockKey]) -> Registry {
        let mut reg = Registry::new();
        for &k in keys {
            reg.find_or_insert(k, LockKind::Sleeper, false);
        }
        reg
    }

    #[test]
    fn first_order_is_recorded_without_violation() {
        let mut reg = registry_with(&[1, 2]);
        let violations = reg.update_order(&[1], 2);
        assert!(violations.is_empty());
        assert!(reg.find(2).unwrap().predecessors().contains(1));
    }

    #[test]
    fn direct_inversion_is_detected() {
        let mut reg = registry_with(&[1, 2]);
        assert!(reg.update_order(&[1], 2).is_empty());
        let violations = reg.update_order(&[2], 1);
        assert_eq!(violations, vec![OrderViolation::Inversion { held: 2 }]);
        // The offending edge is not recorded.
        assert!(!reg.find(1).unwrap().predecessors().contains(2));
    }

    #[test]
    fn transitive_inversion_is_detected() {
        let mut reg = registry_with(&[1, 2, 3]);
        assert!(reg.update_order(&[1], 2).is_empty());
        assert!(reg.update_order(&[2], 3).is_empty());
        let violations = reg.update_order(&[3], 1);
        assert_eq!(violations, vec![OrderViolation::Inversion { held: 3 }]);
    }

    #[test]
    fn recursive_reentry_is_silent() {
        let mut reg = Registry::new();
        reg.find_or_insert(1, LockKind::Sleeper, true);
        assert!(reg.update_order(&[1], 1).is_empty());
        // A lock never points at itself.
        assert!(!reg.find(1).unwrap().predecessors().contains(1));
    }

    #[test]
    fn non_recursive_reentry_is_a_self_deadlock() {
        let mut reg = registry_with(&[1]);
        let violations = reg.update_order(&[1], 1);
        assert_eq!(violations, vec![OrderViolation::SelfDeadlock]);
        assert!(!reg.find(1).unwrap().predecessors().contains(1));
    }

    #[test]
    fn multiple_held_locks_are_processed_independently() {
        let mut reg = registry_with(&[1, 2, 3]);
        assert!(reg.update_order(&[3], 1).is_empty());
        // Holding 1 and 3 while taking 3's predecessor 1... held=[1,3],
        // key=2: edge 1->2 records fine, then 3->2 also records fine.
        let violations = reg.update_order(&[1, 3], 2);
        assert!(violations.is_empty());
        let preds = reg.find(2).unwrap().predecessors();
        assert!(preds.contains(1));
        assert!(preds.contains(3));
    }

    #[test]
    fn violation_does_not_roll_back_earlier_edges() {
        let mut reg = registry_with(&[1, 2, 3]);
        assert!(reg.update_order(&[2], 3).is_empty());
        // held=[1,3], key=2: the edge 1->2 lands, then 3 reveals an
        // inversion because 2 before 3 is already established.
        let violations = reg.update_order(&[1, 3], 2);
        assert_eq!(violations, vec![OrderViolation::Inversion { held: 3 }]);
        assert!(reg.find(2).unwrap().predecessors().contains(1));
    }

    #[test]
    fn unknown_held_lock_is_reported() {
        let mut reg = registry_with(&[2]);
        let violations = reg.update_order(&[99], 2);
        assert_eq!(violations, vec![OrderViolation::UnknownHeld { held: 99 }]);
    }

    #[test]
    fn searches_do_not_interfere() {
        let mut reg = registry_with(&[1, 2, 3, 4]);
        assert!(reg.update_order(&[1], 2).is_empty());
        assert!(reg.update_order(&[2], 3).is_empty());
        // First search walks 3 -> 2 -> 1 and colors the nodes; the second
        // search must still see everything.
        assert!(reg.path_exists(3, 1));
        assert!(reg.path_exists(3, 1));
        assert!(!reg.path_exists(1, 3));
    }

    #[test]
    fn destroy_clears_incoming_edges_for_reuse() {
        let mut reg = registry_with(&[1, 2]);
        assert!(reg.update_order(&[1], 2).is_empty());
        reg.remove(1);
        reg.find_or_insert(1, LockKind::Sleeper, false);
        // Address reuse starts clean: the old 1-before-2 order is gone.
        assert!(reg.update_order(&[2], 1).is_empty());
    }
}
