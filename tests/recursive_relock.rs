//! Recursive locks may be re-entered by their holder; non-recursive locks
//! may not, and the re-entry is reported as a self-deadlock.

mod common;

use locksmith::{Fault, hooks};

const RECURSIVE: usize = 0x8000;
const PLAIN: usize = 0x8100;

#[test]
fn reentry_faults_follow_the_recursive_attribute() {
    let harness = common::start_verifier();

    let created = hooks::pre_init(RECURSIVE, true, true).unwrap();
    hooks::post_init(RECURSIVE, 0, created);
    let created = hooks::pre_init(PLAIN, true, false).unwrap();
    hooks::post_init(PLAIN, 0, created);

    // Recursive: two acquisitions, two releases, no complaints.
    for _ in 0..2 {
        hooks::pre_lock(RECURSIVE, true).unwrap();
        hooks::post_lock(RECURSIVE, 0);
    }
    for _ in 0..2 {
        hooks::pre_unlock(RECURSIVE).unwrap();
        hooks::post_unlock(RECURSIVE);
    }
    harness.assert_clean();

    // A third unlock is one too many.
    assert_eq!(hooks::pre_unlock(RECURSIVE), Err(Fault::NotHeld));
    harness.clear();

    // Non-recursive: the second acquisition is a self-deadlock, though the
    // operation itself proceeds (the native lock gets to make its own
    // ruling).
    hooks::pre_lock(PLAIN, true).unwrap();
    hooks::post_lock(PLAIN, 0);
    assert_eq!(hooks::pre_lock(PLAIN, true), Ok(()));
    assert_eq!(harness.faults(), vec![Fault::SelfDeadlock]);
    assert!(
        harness.diagnostics()[0]
            .message
            .contains("not a recursive lock")
    );
    hooks::post_lock(PLAIN, 0);

    hooks::pre_unlock(PLAIN).unwrap();
    hooks::post_unlock(PLAIN);
    hooks::pre_unlock(PLAIN).unwrap();
    hooks::post_unlock(PLAIN);
    assert_eq!(harness.count_of(Fault::SelfDeadlock), 1);
}
