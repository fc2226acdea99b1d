//! A condition wait on a mutex the calling thread does not hold is refused
//! with a permission fault before the native wait can be reached.

mod common;

use locksmith::{Fault, hooks};

const MUTEX_M: usize = 0xb000;

#[test]
fn cond_wait_requires_the_mutex_to_be_held() {
    let harness = common::start_verifier();

    assert_eq!(hooks::pre_cond_wait(MUTEX_M), Err(Fault::CondWaitUnheld));
    assert_eq!(Fault::CondWaitUnheld.errno(), libc::EPERM);
    assert_eq!(harness.faults(), vec![Fault::CondWaitUnheld]);
    assert!(
        harness.diagnostics()[0]
            .message
            .contains("does not currently hold")
    );

    harness.clear();
    hooks::pre_lock(MUTEX_M, true).unwrap();
    hooks::post_lock(MUTEX_M, 0);
    assert!(hooks::check_locked(MUTEX_M));

    // Held: the wait may proceed, and the mutex stays logically held
    // across it from the verifier's point of view.
    assert_eq!(hooks::pre_cond_wait(MUTEX_M), Ok(()));
    assert!(hooks::check_locked(MUTEX_M));

    hooks::pre_unlock(MUTEX_M).unwrap();
    hooks::post_unlock(MUTEX_M);
    assert!(!hooks::check_locked(MUTEX_M));
    harness.assert_clean();
}
