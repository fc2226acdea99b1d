use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of an observed user lock.
///
/// This is the numeric address of the user's lock object. It is stable for
/// the lifetime of the lock and totally ordered, which is all the registry
/// and the dependency graph need from it.
pub type LockKey = usize;

/// Maximum length of a thread name, in bytes. Longer names are silently
/// truncated.
pub const THREAD_NAME_MAX: usize = 32;

/// What flavor of lock a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockKind {
    /// A blocking lock whose waiters may yield the CPU (a mutex).
    Sleeper,
    /// A busy-wait lock whose waiters do not yield (a spinlock).
    Spin,
}

impl LockKind {
    /// Kind from the `is_sleeper` flag the shim passes across the boundary.
    pub fn from_sleeper(sleeper: bool) -> LockKind {
        if sleeper {
            LockKind::Sleeper
        } else {
            LockKind::Spin
        }
    }

    pub fn is_sleeper(self) -> bool {
        matches!(self, LockKind::Sleeper)
    }
}

/// How bad a fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The operation proceeds; the diagnostic is advisory.
    Warning,
    /// A genuine misuse of the locking API.
    Error,
}

/// The fault taxonomy.
///
/// Every diagnostic the verifier emits carries one of these. The numeric
/// codes are part of the reporting contract: sinks receive them, and the
/// shim layer converts them to the native error convention via
/// [`Fault::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Fault {
    /// Acquiring this lock would create a cycle with locks already held.
    #[error("lock inversion detected")]
    LockInversion,
    /// A non-recursive lock was re-acquired by the thread that holds it.
    #[error("non-recursive lock re-acquired by its holder")]
    SelfDeadlock,
    /// A thread unlocked a lock it does not hold.
    #[error("unlock of a lock the thread does not hold")]
    NotHeld,
    /// A lock was destroyed while somebody still holds it.
    #[error("destroy of a lock that is still in use")]
    DestroyInUse,
    /// A condition wait was issued on a mutex the thread does not hold.
    #[error("condition wait on an unheld mutex")]
    CondWaitUnheld,
    /// A sleeping lock was taken while a spin lock was held.
    #[error("sleeping lock taken while holding a spin lock")]
    SpinHoldingSleeper,
    /// The verifier failed to allocate memory for its own bookkeeping.
    #[error("verifier allocation failure")]
    OutOfMemory,
    /// The verifier's own invariants broke; state may be incomplete.
    #[error("internal verifier error")]
    Internal,
}

impl Fault {
    /// The stable numeric code for this fault.
    pub fn code(self) -> i32 {
        match self {
            Fault::LockInversion => 1,
            Fault::SelfDeadlock => 2,
            Fault::NotHeld => 3,
            Fault::DestroyInUse => 4,
            Fault::CondWaitUnheld => 5,
            Fault::SpinHoldingSleeper => 6,
            Fault::OutOfMemory => 7,
            Fault::Internal => 8,
        }
    }

    /// The closest errno for this fault, used when a hook status must be
    /// returned through a POSIX-shaped interface.
    pub fn errno(self) -> i32 {
        match self {
            Fault::LockInversion => libc::EDEADLK,
            Fault::SelfDeadlock => libc::EDEADLK,
            Fault::NotHeld => libc::EPERM,
            Fault::DestroyInUse => libc::EBUSY,
            Fault::CondWaitUnheld => libc::EPERM,
            Fault::SpinHoldingSleeper => libc::EWOULDBLOCK,
            Fault::OutOfMemory => libc::ENOMEM,
            Fault::Internal => libc::EIO,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Fault::SpinHoldingSleeper => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One emitted diagnostic.
///
/// Produced by the hooks, delivered to the configured sink after all
/// verifier locks have been released. Serializable so embedders can log or
/// ship it in structured form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Which fault this is.
    pub fault: Fault,
    /// Human-readable description, including the lock key and thread name.
    pub message: String,
    /// Name of the thread that triggered the fault.
    pub thread: String,
    /// Symbolic stack frames of the triggering operation, outermost last.
    /// Empty when no backtrace was captured for this operation.
    pub frames: Vec<String>,
    /// RFC 3339 timestamp of when the fault was detected.
    pub timestamp: String,
}

impl Diagnostic {
    pub(crate) fn new(fault: Fault, thread: &str, message: String) -> Diagnostic {
        Diagnostic {
            fault,
            message,
            thread: thread.to_owned(),
            frames: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub(crate) fn with_frames(mut self, frames: &[String]) -> Diagnostic {
        self.frames = frames.to_vec();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_codes_are_stable() {
        assert_eq!(Fault::LockInversion.code(), 1);
        assert_eq!(Fault::SelfDeadlock.code(), 2);
        assert_eq!(Fault::NotHeld.code(), 3);
        assert_eq!(Fault::DestroyInUse.code(), 4);
        assert_eq!(Fault::CondWaitUnheld.code(), 5);
        assert_eq!(Fault::SpinHoldingSleeper.code(), 6);
        assert_eq!(Fault::OutOfMemory.code(), 7);
        assert_eq!(Fault::Internal.code(), 8);
    }

    #[test]
    fn errno_mapping_matches_posix_conventions() {
        assert_eq!(Fault::NotHeld.errno(), libc::EPERM);
        assert_eq!(Fault::DestroyInUse.errno(), libc::EBUSY);
        assert_eq!(Fault::LockInversion.errno(), libc::EDEADLK);
        assert_eq!(Fault::OutOfMemory.errno(), libc::ENOMEM);
    }

    #[test]
    fn only_spin_holding_sleeper_is_a_warning() {
        for f in [
            Fault::LockInversion,
            Fault::SelfDeadlock,
            Fault::NotHeld,
            Fault::DestroyInUse,
            Fault::CondWaitUnheld,
            Fault::OutOfMemory,
            Fault::Internal,
        ] {
            assert_eq!(f.severity(), Severity::Error);
        }
        assert_eq!(Fault::SpinHoldingSleeper.severity(), Severity::Warning);
    }
}
