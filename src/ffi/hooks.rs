use crate::core::hooks;
use crate::ffi::{key_of, status};
use std::ffi::c_void;
use std::os::raw::c_int;

/// Register a lock that is being explicitly initialized.
///
/// Call before the native init. `is_sleeper` distinguishes blocking
/// mutexes from busy-wait spinlocks; `is_recursive` should be nonzero when
/// the lock's attributes allow same-thread re-acquisition (or when the
/// attributes are unknown, as the safe default). On success, `created`
/// (when non-NULL) receives `1` if this call created the lock record and
/// `0` if one already existed; the shim must hand that value back to
/// `locksmith_post_init` so a failed native init only retires a record
/// this pairing created.
///
/// # Returns
/// * `0` on success; the shim should proceed to the native init
/// * `EINVAL` if `lock` is NULL
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced. `created`
/// must be NULL or valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_pre_init(
    lock: *const c_void,
    is_sleeper: c_int,
    is_recursive: c_int,
    created: *mut c_int,
) -> c_int {
    if !created.is_null() {
        unsafe { *created = 0 };
    }
    let Some(key) = key_of(lock) else {
        return libc::EINVAL;
    };
    match hooks::pre_init(key, is_sleeper != 0, is_recursive != 0) {
        Ok(was_created) => {
            if !created.is_null() {
                unsafe { *created = was_created as c_int };
            }
            0
        }
        Err(fault) => fault.errno(),
    }
}

/// Observe the native init result. `created` is the value produced by the
/// paired `locksmith_pre_init`; a failed native init retires the record
/// only when that pairing created it. A shim that did not capture the flag
/// should pass `0`, which leaves existing records alone.
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_post_init(
    lock: *const c_void,
    native_result: c_int,
    created: c_int,
) {
    if let Some(key) = key_of(lock) {
        hooks::post_init(key, native_result, created != 0);
    }
}

/// Validate a destroy before the native call.
///
/// # Returns
/// * `0` on success; the shim should proceed to the native destroy
/// * `EBUSY` if the lock still has holders; the native call must be skipped
/// * `EINVAL` if `lock` is NULL
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_pre_destroy(lock: *const c_void) -> c_int {
    let Some(key) = key_of(lock) else {
        return libc::EINVAL;
    };
    status(hooks::pre_destroy(key))
}

/// Run dependency analysis for a lock, trylock, or timedlock attempt.
///
/// Always returns `0` for a valid pointer: lock-order faults are reported
/// through the sink, and the operation proceeds.
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_pre_lock(lock: *const c_void, is_sleeper: c_int) -> c_int {
    let Some(key) = key_of(lock) else {
        return libc::EINVAL;
    };
    status(hooks::pre_lock(key, is_sleeper != 0))
}

/// Observe the native lock result. Pass the value the native primitive
/// returned, including `EBUSY` from a failed trylock.
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_post_lock(lock: *const c_void, native_result: c_int) {
    if let Some(key) = key_of(lock) {
        hooks::post_lock(key, native_result);
    }
}

/// Validate an unlock before the native call.
///
/// # Returns
/// * `0` on success; the shim should proceed to the native unlock
/// * `EPERM` if the calling thread does not hold the lock; skip the native
///   call
/// * `EINVAL` if `lock` is NULL
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_pre_unlock(lock: *const c_void) -> c_int {
    let Some(key) = key_of(lock) else {
        return libc::EINVAL;
    };
    status(hooks::pre_unlock(key))
}

/// Observe a completed native unlock.
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_post_unlock(lock: *const c_void) {
    if let Some(key) = key_of(lock) {
        hooks::post_unlock(key);
    }
}

/// Validate a condition wait against the mutex it releases and reacquires.
///
/// # Returns
/// * `0` if the calling thread holds the mutex; proceed to the native wait
/// * `EPERM` if it does not; skip the native call
/// * `EINVAL` if `mutex` is NULL
///
/// # Safety
/// `mutex` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_pre_cond_wait(mutex: *const c_void) -> c_int {
    let Some(key) = key_of(mutex) else {
        return libc::EINVAL;
    };
    status(hooks::pre_cond_wait(key))
}

/// Whether the calling thread currently holds `lock`.
///
/// # Returns
/// * `0` if the lock is held (or the thread is in pass-through mode)
/// * `-1` if it is not held
/// * `EINVAL` if `lock` is NULL
///
/// # Safety
/// `lock` is only used as an identity and is never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_check_locked(lock: *const c_void) -> c_int {
    let Some(key) = key_of(lock) else {
        return libc::EINVAL;
    };
    if hooks::check_locked(key) { 0 } else { -1 }
}
