//! Per-thread verifier state.
//!
//! Each thread owns a [`ThreadCtx`]: its name, the stack of lock keys it
//! currently holds (in acquisition order, duplicates allowed for recursive
//! holds), how many spin locks are among them, and the `intercepting` gate
//! that keeps the verifier from observing its own calls back into the
//! threading library, the backtrace provider, or the sink.
//!
//! The context lives in a `thread_local!` and is released by its `Drop`
//! when the thread exits. No other thread ever reads it.

use crate::core::types::{LockKey, THREAD_NAME_MAX};
use std::cell::RefCell;

/// State the verifier keeps for one thread.
#[derive(Debug)]
pub struct ThreadCtx {
    /// Bounded thread name; defaults to a platform-derived identifier.
    name: String,
    /// Keys of locks currently held, in acquisition order. A key appears
    /// once per recursive hold.
    held: Vec<LockKey>,
    /// Number of currently-held spin locks.
    spins_held: u64,
    /// While false, every hook is a pass-through. Cleared around any call
    /// the verifier makes that could itself be observed.
    intercepting: bool,
}

impl ThreadCtx {
    fn new() -> ThreadCtx {
        ThreadCtx {
            name: platform_thread_name(),
            held: Vec::new(),
            spins_held: 0,
            intercepting: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename this thread, silently truncating to [`THREAD_NAME_MAX`] bytes.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(THREAD_NAME_MAX);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.clear();
        self.name.push_str(&name[..end]);
    }

    /// Append `key` to the held stack. Duplicates are legal; that is how
    /// recursive re-entry is represented.
    pub fn push_held(&mut self, key: LockKey) {
        self.held.push(key);
    }

    /// Remove the last occurrence of `key` from the held stack.
    ///
    /// # Returns
    /// `true` if an occurrence was removed, `false` if the thread does not
    /// hold `key`.
    pub fn pop_held(&mut self, key: LockKey) -> bool {
        match self.held.iter().rposition(|&k| k == key) {
            Some(pos) => {
                self.held.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn holds(&self, key: LockKey) -> bool {
        self.held.contains(&key)
    }

    /// The held stack in acquisition order.
    pub fn held(&self) -> &[LockKey] {
        &self.held
    }

    pub fn spins_held(&self) -> u64 {
        self.spins_held
    }

    pub fn note_spin_acquired(&mut self) {
        self.spins_held += 1;
    }

    pub fn note_spin_released(&mut self) {
        self.spins_held = self.spins_held.saturating_sub(1);
    }
}

thread_local! {
    static CTX: RefCell<ThreadCtx> = RefCell::new(ThreadCtx::new());
}

/// Run `f` against the calling thread's context.
///
/// Hooks must not hold the borrow across any call that could re-enter the
/// verifier; they read what they need, release, and only then talk to the
/// outside world.
pub fn with<R>(f: impl FnOnce(&mut ThreadCtx) -> R) -> R {
    CTX.with(|ctx| f(&mut ctx.borrow_mut()))
}

/// Whether hooks should observe anything on this thread right now.
///
/// Returns false while an [`InterceptGuard`] is active, and also during
/// thread teardown when the context is no longer reachable, so that a
/// late hook degrades to a pass-through instead of panicking.
pub fn intercepting() -> bool {
    CTX.try_with(|ctx| ctx.borrow().intercepting)
        .unwrap_or(false)
}

/// Scoped suppression of interception.
///
/// While alive, every hook on this thread is a no-op pass-through. Taken
/// around symbol resolution, backtrace capture, sink invocation, and any
/// direct call into the native threading library.
pub struct InterceptGuard {
    was: bool,
}

impl InterceptGuard {
    pub fn suppress() -> InterceptGuard {
        let was = CTX
            .try_with(|ctx| {
                let mut ctx = ctx.borrow_mut();
                let was = ctx.intercepting;
                ctx.intercepting = false;
                was
            })
            .unwrap_or(false);
        InterceptGuard { was }
    }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        let _ = CTX.try_with(|ctx| ctx.borrow_mut().intercepting = self.was);
    }
}

/// Name for a fresh thread.
///
/// On Linux the kernel thread id is used, so the name lines up with what
/// other debugging tools show for the same thread. Elsewhere a process-wide
/// counter supplies an arbitrary but unique number.
#[cfg(target_os = "linux")]
fn platform_thread_name() -> String {
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    format!("thread_{tid}")
}

#[cfg(not(target_os = "linux"))]
fn platform_thread_name() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);
    format!("thread_{}", NEXT_TID.fetch_add(1, Ordering::Relaxed))
}
