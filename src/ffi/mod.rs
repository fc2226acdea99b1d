//! C ABI for the interposition shim.
//!
//! This module exports the hook protocol, the thread-naming calls, and the
//! callback registration entry points with C linkage, so the shim layer
//! (typically an `LD_PRELOAD` library providing the `pthread_*` symbols)
//! can be written in C and link directly against this crate built as a
//! `cdylib`.
//!
//! Lock identity crosses the boundary as the address of the user's lock
//! object, passed as `*const c_void`. Hook status crosses back as the
//! errno-style codes of [`Fault::errno`]: `0` tells the shim to call the
//! native primitive, anything else tells it to skip the call and return
//! that value (warnings never surface as a status).

mod hooks;
mod thread;

pub use hooks::*;
pub use thread::*;

use crate::core::{
    Fault, JsonCallbackSink, RawCallbackSink, RawErrorCallback, RawReportCallback, StderrSink,
};
use crate::core::hooks as verifier_hooks;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::sync::Arc;

pub(crate) fn key_of(lock: *const c_void) -> Option<usize> {
    if lock.is_null() { None } else { Some(lock as usize) }
}

pub(crate) fn status(result: Result<(), Fault>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(fault) => fault.errno(),
    }
}

/// Get the current verifier ABI version.
#[unsafe(no_mangle)]
pub extern "C" fn locksmith_api_version() -> u32 {
    crate::API_VERSION
}

/// Route diagnostics to `callback`, which receives the numeric fault code
/// and a rendered message. Passing NULL restores the default stderr sink.
///
/// # Safety
/// The callback must stay valid for the life of the process and must be
/// safe to invoke from any thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_set_error_cb(callback: Option<RawErrorCallback>) {
    match callback {
        Some(cb) => crate::core::replace_sink(Arc::new(RawCallbackSink::new(cb))),
        None => crate::core::replace_sink(Arc::new(StderrSink)),
    }
}

/// Route diagnostics to `callback` as JSON documents, one per diagnostic.
/// Passing NULL restores the default stderr sink.
///
/// # Safety
/// The callback must stay valid for the life of the process and must be
/// safe to invoke from any thread. The JSON pointer is only valid for the
/// duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn locksmith_set_report_cb(callback: Option<RawReportCallback>) {
    match callback {
        Some(cb) => crate::core::replace_sink(Arc::new(JsonCallbackSink::new(cb))),
        None => crate::core::replace_sink(Arc::new(StderrSink)),
    }
}

/// Touch the verifier from a freshly created thread, creating its context
/// and completing global bootstrap if this is the first touch.
#[unsafe(no_mangle)]
pub extern "C" fn locksmith_init_thread() {
    verifier_hooks::init_thread();
}
