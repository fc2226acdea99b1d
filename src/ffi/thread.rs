use crate::core::hooks;
use std::os::raw::{c_char, c_int};

/// Name the calling thread for diagnostics and the holder ledger.
///
/// Names longer than the internal bound are silently truncated.
///
/// # Returns
/// * `0` on success
/// * `EINVAL` if `name` is NULL
///
/// # Safety
/// `name` must be NULL or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_set_thread_name(name: *const c_char) -> c_int {
    if name.is_null() {
        return libc::EINVAL;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(name) }.to_string_lossy();
    hooks::set_thread_name(&name);
    0
}

/// Copy the calling thread's name into `buf`, NUL-terminated, truncating
/// if `buf_len` is too small.
///
/// # Returns
/// * `0` on success
/// * `EINVAL` if `buf` is NULL or `buf_len` is zero
///
/// # Safety
/// `buf` must be NULL or valid for writes of `buf_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_get_thread_name(buf: *mut c_char, buf_len: usize) -> c_int {
    if buf.is_null() || buf_len == 0 {
        return libc::EINVAL;
    }
    let name = hooks::get_thread_name();
    let bytes = name.as_bytes();
    let copy_len = bytes.len().min(buf_len - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, copy_len);
        *buf.add(copy_len) = 0;
    }
    0
}
