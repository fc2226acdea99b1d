//! # Locksmith
//!
//! A runtime lock-discipline verifier for programs that use POSIX-style
//! threading primitives.
//!
//! Locksmith is designed to sit behind an interposition shim: the shim is
//! loaded ahead of the system threading library, forwards every observed
//! mutex, spinlock, and condition-variable operation through the pre/post
//! hooks in [`hooks`], and converts the returned status to the native error
//! convention. No recompilation of the target program is needed, and no
//! replacement threading API is offered; the verifier only watches.
//!
//! ## What it checks
//!
//! - **Lock inversions**: a global "must-be-acquired-before" graph is
//!   maintained across all threads; an acquisition that would close a cycle
//!   is reported even if no deadlock happens on this run.
//! - **Self-deadlock**: re-acquiring a non-recursive lock you already hold.
//! - **Unlock discipline**: unlocking a lock the thread does not hold, and
//!   destroying a lock that is still in use, are refused before the native
//!   call can corrupt anything.
//! - **Condition waits** on a mutex the caller does not hold.
//! - **Spin-then-sleep**: taking a sleeping lock while holding a spin lock,
//!   warned once per lock.
//!
//! Diagnostics flow to a configurable sink: stderr (the default), stdout,
//! the system log, a file, or a callback. See [`DiagnosticSink`].
//!
//! ## Configuration
//!
//! Everything can be driven from the environment, which is the natural fit
//! for an interposed process:
//!
//! | variable | effect |
//! |---|---|
//! | `LKSMITH_LOG` | `stderr`, `stdout`, `syslog`, `file://PATH`, `callback://0xADDR` |
//! | `LKSMITH_IGNORED_FRAMES` | colon-separated frame symbols to ignore |
//! | `LKSMITH_IGNORED_FRAME_PATTERNS` | colon-separated glob patterns to ignore |
//!
//! A program embedding the verifier directly can configure it in code
//! instead, before the first observed operation:
//!
//! ```no_run
//! use locksmith::Locksmith;
//!
//! Locksmith::new()
//!     .callback(|diag| eprintln!("lock fault {}: {}", diag.fault.code(), diag.message))
//!     .init()
//!     .expect("already initialized");
//! ```
//!
//! ## Hook protocol
//!
//! For each observed primitive the shim calls a pre-hook, then the native
//! primitive, then a post-hook with the native result:
//!
//! ```no_run
//! use locksmith::hooks;
//!
//! let key = 0x7f00_1234_usize; // address of the user's mutex
//! hooks::pre_lock(key, true).unwrap();
//! let rc = 0; // ... call the native mutex_lock here ...
//! hooks::post_lock(key, rc);
//! ```
//!
//! A non-`Ok` pre-hook status means the shim should skip the native call
//! and return the corresponding error. C-callable exports of the same
//! surface live in [`ffi`].

mod core;
pub use core::{
    BacktraceProvider, CallbackSink, Diagnostic, DiagnosticSink, Fault, FileSink,
    JsonCallbackSink, LockKey, LockKind, Locksmith, NoBacktraceProvider, RawCallbackSink,
    RawErrorCallback, RawReportCallback, Severity, StdBacktraceProvider, StderrSink, StdoutSink,
    SyslogSink, THREAD_NAME_MAX, hooks, ignored_frame_patterns, ignored_frames,
};

pub mod ffi;

/// The current verifier ABI version: major in the upper 16 bits, minor in
/// the lower. Minor bumps may add to the surface but never break it.
pub const API_VERSION: u32 = 0x0001_0000;
