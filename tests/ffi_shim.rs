//! Driving the verifier the way a C shim would: through the exported
//! C-ABI hooks, with errno-style statuses coming back.

mod common;

use locksmith::{Fault, ffi};
use std::ffi::c_void;
use std::os::raw::c_int;

fn key(addr: usize) -> *const c_void {
    addr as *const c_void
}

#[test]
fn c_abi_hooks_mirror_the_rust_surface() {
    let harness = common::start_verifier();

    unsafe {
        // init + lock + destroy-while-held, all through the shim surface.
        let mut created: c_int = -1;
        assert_eq!(ffi::locksmith_pre_init(key(0xd000), 1, 0, &mut created), 0);
        assert_eq!(created, 1);
        ffi::locksmith_post_init(key(0xd000), 0, created);
        assert_eq!(ffi::locksmith_pre_lock(key(0xd000), 1), 0);
        ffi::locksmith_post_lock(key(0xd000), 0);
        assert_eq!(ffi::locksmith_check_locked(key(0xd000)), 0);

        assert_eq!(ffi::locksmith_pre_destroy(key(0xd000)), libc::EBUSY);
        assert_eq!(harness.count_of(Fault::DestroyInUse), 1);

        assert_eq!(ffi::locksmith_pre_unlock(key(0xd000)), 0);
        ffi::locksmith_post_unlock(key(0xd000));
        assert_eq!(ffi::locksmith_check_locked(key(0xd000)), -1);
        assert_eq!(ffi::locksmith_pre_destroy(key(0xd000)), 0);

        // Misuse statuses map to the native convention.
        assert_eq!(ffi::locksmith_pre_unlock(key(0xd100)), libc::EPERM);
        assert_eq!(ffi::locksmith_pre_cond_wait(key(0xd100)), libc::EPERM);

        // NULL is rejected outright, with nothing recorded.
        harness.clear();
        assert_eq!(ffi::locksmith_pre_lock(std::ptr::null(), 1), libc::EINVAL);
        assert_eq!(ffi::locksmith_pre_unlock(std::ptr::null()), libc::EINVAL);
        assert_eq!(ffi::locksmith_pre_destroy(std::ptr::null()), libc::EINVAL);
        harness.assert_clean();
    }
}
