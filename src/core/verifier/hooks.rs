//! The interposition protocol.
//!
//! Every observed primitive is wrapped by a pre/post hook pair. The shim
//! layer calls the pre-hook, then (unless told otherwise) the native
//! primitive, then the post-hook with the native result. The hooks drive
//! the thread context, the registry, the dependency graph, and the holder
//! ledger, and emit diagnostics for everything in the fault taxonomy.
//!
//! Two rules hold throughout:
//!
//! - A hook that finds interception disabled on its thread returns
//!   immediately with success. That is what makes the verifier safe against
//!   observing its own calls into the threading library, the backtrace
//!   provider, or the sink.
//! - The registry lock is released before any diagnostic is delivered, so
//!   a sink can take locks of its own without deadlocking the verifier.
//!
//! Pre-hooks on the lock path always tell the shim to proceed; lock-order
//! faults are reported, not enforced. Only `pre_unlock`, `pre_destroy`,
//! and `pre_cond_wait` return blocking faults, which the shim converts to
//! the native error convention instead of calling the primitive.

use crate::core::context;
use crate::core::graph::OrderViolation;
use crate::core::registry::HolderEntry;
use crate::core::types::{Diagnostic, Fault, LockKey, LockKind};
use crate::core::verifier::{self, capture_frames, emit};

/// Register a lock that is being explicitly initialized.
///
/// Calling this twice for the same key is a no-op success: the lock may
/// already have a record because it was statically initialized and touched
/// before its init was observed.
///
/// # Returns
/// Whether this call created the record. The caller hands that flag to the
/// paired [`post_init`], which must not retire a record this pairing did
/// not create.
pub fn pre_init(key: LockKey, is_sleeper: bool, is_recursive: bool) -> Result<bool, Fault> {
    if !context::intercepting() {
        return Ok(false);
    }
    let state = verifier::state();
    let mut registry = state.registry.lock();
    let (_, created) =
        registry.find_or_insert(key, LockKind::from_sleeper(is_sleeper), is_recursive);
    Ok(created)
}

/// Observe the result of the native init.
///
/// `created` is what the paired [`pre_init`] returned. If the native init
/// failed and that pairing created the record, it is retired again so a
/// later retry starts clean. A record that predates the pairing survives
/// untouched, accumulated ordering knowledge included.
pub fn post_init(key: LockKey, native_result: i32, created: bool) {
    if !context::intercepting() || native_result == 0 || !created {
        return;
    }
    let state = verifier::state();
    let mut registry = state.registry.lock();
    let unheld = registry
        .find(key)
        .map(|record| record.holders().is_empty())
        .unwrap_or(false);
    if unheld {
        registry.remove(key);
    }
}

/// Validate and carry out the bookkeeping for a destroy.
///
/// An unknown key is tolerated silently: a statically-initialized lock
/// that was never operated on has no record to retire. A lock that still
/// has holders is refused with [`Fault::DestroyInUse`] and the native
/// destroy is skipped.
pub fn pre_destroy(key: LockKey) -> Result<(), Fault> {
    if !context::intercepting() {
        return Ok(());
    }
    let state = verifier::state();
    let thread = context::with(|ctx| ctx.name().to_owned());
    let mut diags = Vec::new();
    let mut result = Ok(());
    {
        let mut registry = state.registry.lock();
        match registry.find(key) {
            None => {}
            Some(record) if !record.holders().is_empty() => {
                let message = if context::with(|ctx| ctx.holds(key)) {
                    format!(
                        "pre_destroy(lock={key:#x}, thread={thread}): you must unlock \
                         this lock before destroying it"
                    )
                } else {
                    format!(
                        "pre_destroy(lock={key:#x}, thread={thread}): this lock is \
                         currently in use and so cannot be destroyed"
                    )
                };
                diags.push(Diagnostic::new(Fault::DestroyInUse, &thread, message));
                result = Err(Fault::DestroyInUse);
            }
            Some(_) => {
                registry.remove(key);
            }
        }
    }
    emit(diags);
    result
}

/// Run the dependency analysis for an acquisition attempt and record the
/// caller as a pending holder.
///
/// Runs for `lock`, `trylock`, and `timedlock` alike; an attempt reveals
/// ordering intent whether or not it subsequently succeeds. A previously
/// unseen key gets a record on the spot, assumed recursive since it may
/// have been statically initialized as such.
///
/// Lock-order faults are emitted but the shim is always told to proceed.
pub fn pre_lock(key: LockKey, is_sleeper: bool) -> Result<(), Fault> {
    if !context::intercepting() {
        return Ok(());
    }
    let state = verifier::state();
    let frames = capture_frames();
    let (thread, held) = context::with(|ctx| (ctx.name().to_owned(), ctx.held().to_vec()));
    let skip_deps = state.filter.read().matches(&frames);

    let mut diags = Vec::new();
    {
        let mut registry = state.registry.lock();
        registry.find_or_insert(key, LockKind::from_sleeper(is_sleeper), true);
        if !skip_deps {
            for violation in registry.update_order(&held, key) {
                diags.push(order_diag(violation, key, &thread, &frames));
            }
        }
        if let Some(record) = registry.find_mut(key) {
            record.add_holder(HolderEntry {
                thread: thread.clone(),
                frames,
            });
        }
    }
    emit(diags);
    Ok(())
}

/// Observe the result of the native lock operation.
///
/// On success the key joins the thread's held stack and the spin counter
/// is maintained; taking a sleeper while a spin lock is held draws a
/// one-per-lock warning. On failure the holder entry pushed by
/// [`pre_lock`] is rolled back, but recorded ordering edges stay.
pub fn post_lock(key: LockKey, native_result: i32) {
    if !context::intercepting() {
        return;
    }
    let state = verifier::state();
    let thread = context::with(|ctx| ctx.name().to_owned());
    let mut diags = Vec::new();
    {
        let mut registry = state.registry.lock();
        match registry.find_mut(key) {
            None => {
                diags.push(Diagnostic::new(
                    Fault::Internal,
                    &thread,
                    format!(
                        "post_lock(lock={key:#x}, thread={thread}): logic error: \
                         pre_lock did not create the lock record"
                    ),
                ));
            }
            Some(record) if native_result != 0 => {
                record.remove_holder(&thread);
            }
            Some(record) => {
                record.note_acquired();
                let sleeper = record.kind().is_sleeper();
                let spins = context::with(|ctx| {
                    ctx.push_held(key);
                    if !sleeper {
                        ctx.note_spin_acquired();
                    }
                    ctx.spins_held()
                });
                if sleeper && spins > 0 && record.arm_spin_warning() {
                    diags.push(Diagnostic::new(
                        Fault::SpinHoldingSleeper,
                        &thread,
                        format!(
                            "post_lock(lock={key:#x}, thread={thread}): performance \
                             problem: you are taking a sleeping lock while holding \
                             a spin lock"
                        ),
                    ));
                }
            }
        }
    }
    emit(diags);
}

/// Validate a release.
///
/// Unlocking a lock this thread does not hold is refused with
/// [`Fault::NotHeld`]; the shim skips the native unlock. A record is
/// created for a previously unseen key so later operations on it have
/// state to work against.
pub fn pre_unlock(key: LockKey) -> Result<(), Fault> {
    if !context::intercepting() {
        return Ok(());
    }
    let state = verifier::state();
    let thread = context::with(|ctx| ctx.name().to_owned());
    {
        let mut registry = state.registry.lock();
        registry.find_or_insert(key, LockKind::Sleeper, true);
    }
    if context::with(|ctx| ctx.holds(key)) {
        return Ok(());
    }
    emit(vec![Diagnostic::new(
        Fault::NotHeld,
        &thread,
        format!(
            "pre_unlock(lock={key:#x}, thread={thread}): attempted to unlock a \
             lock that this thread does not currently hold"
        ),
    )]);
    Err(Fault::NotHeld)
}

/// Observe a completed native unlock: pop the held stack, maintain the
/// spin counter, and retire the holder entry.
pub fn post_unlock(key: LockKey) {
    if !context::intercepting() {
        return;
    }
    let state = verifier::state();
    let thread = context::with(|ctx| ctx.name().to_owned());
    let mut diags = Vec::new();

    if !context::with(|ctx| ctx.pop_held(key)) {
        emit(vec![Diagnostic::new(
            Fault::Internal,
            &thread,
            format!(
                "post_unlock(lock={key:#x}, thread={thread}): logic error: the \
                 pre-unlock check passed but the held stack has no entry"
            ),
        )]);
        return;
    }
    {
        let mut registry = state.registry.lock();
        match registry.find_mut(key) {
            None => {
                diags.push(Diagnostic::new(
                    Fault::Internal,
                    &thread,
                    format!(
                        "post_unlock(lock={key:#x}, thread={thread}): logic error: \
                         released a lock the registry does not know"
                    ),
                ));
            }
            Some(record) => {
                if !record.kind().is_sleeper() {
                    context::with(|ctx| ctx.note_spin_released());
                }
                if !record.remove_holder(&thread) {
                    diags.push(Diagnostic::new(
                        Fault::Internal,
                        &thread,
                        format!(
                            "post_unlock(lock={key:#x}, thread={thread}): logic \
                             error: no holder entry for this thread"
                        ),
                    ));
                }
            }
        }
    }
    emit(diags);
}

/// Validate a condition wait against the mutex it rides on.
///
/// The wait's internal release and reacquisition of the mutex are invisible
/// here: from the caller's viewpoint the mutex stays logically held, so no
/// state changes. The only check is that the caller actually holds it.
pub fn pre_cond_wait(key: LockKey) -> Result<(), Fault> {
    if !context::intercepting() {
        return Ok(());
    }
    if context::with(|ctx| ctx.holds(key)) {
        return Ok(());
    }
    let thread = context::with(|ctx| ctx.name().to_owned());
    emit(vec![Diagnostic::new(
        Fault::CondWaitUnheld,
        &thread,
        format!(
            "pre_cond_wait(mutex={key:#x}, thread={thread}): waiting on a mutex \
             that this thread does not currently hold"
        ),
    )]);
    Err(Fault::CondWaitUnheld)
}

/// Whether the calling thread currently holds `key`.
///
/// Pass-through threads answer `true` so that assertion-style callers do
/// not trip while the verifier is talking to itself.
pub fn check_locked(key: LockKey) -> bool {
    if !context::intercepting() {
        return true;
    }
    context::with(|ctx| ctx.holds(key))
}

/// Name the calling thread for diagnostics and the holder ledger. Names
/// longer than the bound are silently truncated.
pub fn set_thread_name(name: &str) {
    context::with(|ctx| ctx.set_name(name));
}

/// The calling thread's current name.
pub fn get_thread_name() -> String {
    context::with(|ctx| ctx.name().to_owned())
}

fn order_diag(
    violation: OrderViolation,
    key: LockKey,
    thread: &str,
    frames: &[String],
) -> Diagnostic {
    let diag = match violation {
        OrderViolation::SelfDeadlock => Diagnostic::new(
            Fault::SelfDeadlock,
            thread,
            format!(
                "pre_lock(lock={key:#x}, thread={thread}): this thread already \
                 holds this lock, and it is not a recursive lock"
            ),
        ),
        OrderViolation::Inversion { held } => Diagnostic::new(
            Fault::LockInversion,
            thread,
            format!(
                "pre_lock(lock={key:#x}, thread={thread}): lock inversion! this \
                 lock should have been taken before lock {held:#x}, which this \
                 thread already holds"
            ),
        ),
        OrderViolation::OutOfMemory { held } => Diagnostic::new(
            Fault::OutOfMemory,
            thread,
            format!(
                "pre_lock(lock={key:#x}, thread={thread}): failed to allocate \
                 space to record lock {held:#x} as a predecessor"
            ),
        ),
        OrderViolation::UnknownHeld { held } => Diagnostic::new(
            Fault::Internal,
            thread,
            format!(
                "pre_lock(lock={key:#x}, thread={thread}): thread holds unknown \
                 lock {held:#x}"
            ),
        ),
    };
    diag.with_frames(frames)
}

/// Touch the verifier from a freshly created thread.
///
/// Not required for correctness (every hook self-initializes), but lets a
/// shim front-load context creation and the global bootstrap in its
/// thread-start wrapper.
pub fn init_thread() {
    let _ = context::intercepting();
    verifier::state();
}
