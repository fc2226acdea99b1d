//! Global verifier state and bootstrap.
//!
//! The verifier has to be ready the first time any hook fires, and that
//! first touch can come from any thread at any point, including a global
//! constructor that runs long before `main`. Initialization is therefore
//! guarded by a one-shot latch that busy-waits on an atomic integer: it
//! depends on no threading primitive, because at that moment none can be
//! assumed usable in an interposed process.
//!
//! Configuration comes from the environment by default (`LKSMITH_LOG`,
//! `LKSMITH_IGNORED_FRAMES`, `LKSMITH_IGNORED_FRAME_PATTERNS`). A program
//! that embeds the verifier directly can instead configure it up front
//! through the [`Locksmith`] builder, as long as it does so before the
//! first observed lock operation.

pub mod filter;
pub mod hooks;

use crate::core::backtrace::{BacktraceProvider, StdBacktraceProvider};
use crate::core::context::InterceptGuard;
use crate::core::registry::Registry;
use crate::core::sink::{self, CallbackSink, DiagnosticSink, StderrSink};
use crate::core::types::Diagnostic;
use crate::core::verifier::filter::FrameFilter;
use anyhow::{Result, bail};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const LATCH_UNSTARTED: u32 = 0;
const LATCH_RUNNING: u32 = 1;
const LATCH_READY: u32 = 2;

/// One-shot initialization latch.
///
/// A plain user-space spin: the winner of the compare-exchange runs the
/// closure, everyone else spins until the state becomes ready. Usable from
/// global constructors.
pub(crate) struct OnceLatch {
    state: AtomicU32,
}

impl OnceLatch {
    pub(crate) const fn new() -> OnceLatch {
        OnceLatch {
            state: AtomicU32::new(LATCH_UNSTARTED),
        }
    }

    /// Run `f` if nobody has yet; otherwise wait until the one run that
    /// counts has finished.
    ///
    /// # Returns
    /// `true` if this call performed the initialization.
    pub(crate) fn call_once(&self, f: impl FnOnce()) -> bool {
        match self.state.compare_exchange(
            LATCH_UNSTARTED,
            LATCH_RUNNING,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                f();
                self.state.store(LATCH_READY, Ordering::Release);
                true
            }
            Err(_) => {
                while self.state.load(Ordering::Acquire) != LATCH_READY {
                    std::hint::spin_loop();
                }
                false
            }
        }
    }

    #[allow(dead_code)]
    pub(crate) fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == LATCH_READY
    }
}

/// Everything process-wide the verifier owns.
pub(crate) struct VerifierState {
    /// The lock registry. This mutex linearizes all graph mutations and is
    /// never held across a sink, backtrace, or native call.
    pub(crate) registry: Mutex<Registry>,
    pub(crate) sink: RwLock<Arc<dyn DiagnosticSink>>,
    pub(crate) filter: RwLock<FrameFilter>,
    pub(crate) backtrace: RwLock<Arc<dyn BacktraceProvider>>,
}

lazy_static::lazy_static! {
    static ref STATE: VerifierState = VerifierState {
        registry: Mutex::new(Registry::new()),
        sink: RwLock::new(Arc::new(StderrSink)),
        filter: RwLock::new(FrameFilter::default()),
        backtrace: RwLock::new(Arc::new(StdBacktraceProvider)),
    };
}

static BOOTSTRAP: OnceLatch = OnceLatch::new();

/// The global state, bootstrapping from the environment on first touch.
pub(crate) fn state() -> &'static VerifierState {
    BOOTSTRAP.call_once(|| {
        let _guard = InterceptGuard::suppress();
        *STATE.sink.write() = sink::sink_from_env();
        *STATE.filter.write() = FrameFilter::from_env();
        announce();
    });
    &STATE
}

fn announce() {
    let sink = STATE.sink.read().clone();
    sink.notice(&format!(
        "lock-discipline verification initialized for process {}",
        std::process::id()
    ));
}

/// Capture a backtrace through the installed provider, with interception
/// suppressed for the duration.
pub(crate) fn capture_frames() -> Vec<String> {
    let provider = state().backtrace.read().clone();
    let _guard = InterceptGuard::suppress();
    provider.capture()
}

/// Deliver diagnostics to the configured sink.
///
/// Callers release the registry lock first; the sink must never run under
/// a verifier lock, and must not observe its own lock usage.
pub(crate) fn emit(diags: Vec<Diagnostic>) {
    if diags.is_empty() {
        return;
    }
    let sink = state().sink.read().clone();
    let _guard = InterceptGuard::suppress();
    for diag in &diags {
        sink.report(diag);
    }
}

/// Replace the sink after bootstrap, e.g. from the C `set_error_cb` entry.
pub(crate) fn replace_sink(sink: Arc<dyn DiagnosticSink>) {
    *state().sink.write() = sink;
}

/// The exact frame names currently ignored, in sorted order.
pub fn ignored_frames() -> Vec<String> {
    state().filter.read().exact_frames().to_vec()
}

/// The ignore pattern sources currently configured.
pub fn ignored_frame_patterns() -> Vec<String> {
    state().filter.read().pattern_sources()
}

/// Builder for explicit, programmatic initialization.
///
/// ```no_run
/// use locksmith::Locksmith;
///
/// Locksmith::new()
///     .callback(|diag| eprintln!("lock fault: {}", diag.message))
///     .ignored_frames(&["test_fixture_inversion"])
///     .init()
///     .expect("verifier already initialized");
/// ```
#[derive(Default)]
pub struct Locksmith {
    sink: Option<Arc<dyn DiagnosticSink>>,
    backtrace: Option<Arc<dyn BacktraceProvider>>,
    ignored_frames: Vec<String>,
    ignored_patterns: Vec<String>,
}

impl Locksmith {
    pub fn new() -> Locksmith {
        Locksmith::default()
    }

    /// Deliver diagnostics to `callback` instead of a stream sink.
    pub fn callback<F>(self, callback: F) -> Locksmith
    where
        F: Fn(Diagnostic) + Send + Sync + 'static,
    {
        self.sink(Arc::new(CallbackSink::new(callback)))
    }

    /// Install a custom diagnostic sink.
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Locksmith {
        self.sink = Some(sink);
        self
    }

    /// Install a custom backtrace provider.
    pub fn backtrace_provider(mut self, provider: Arc<dyn BacktraceProvider>) -> Locksmith {
        self.backtrace = Some(provider);
        self
    }

    /// Frame symbols whose presence in an acquisition backtrace suppresses
    /// dependency analysis for that acquisition.
    pub fn ignored_frames<S: AsRef<str>>(mut self, frames: &[S]) -> Locksmith {
        self.ignored_frames = frames.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    /// Glob patterns with the same effect as [`Locksmith::ignored_frames`].
    pub fn ignored_frame_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Locksmith {
        self.ignored_patterns = patterns.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    /// Perform one-shot initialization with this configuration.
    ///
    /// Pieces left unset fall back to the environment-driven defaults.
    ///
    /// # Errors
    /// Fails if the verifier has already been initialized, whether by an
    /// earlier builder or by a hook's first touch.
    pub fn init(self) -> Result<()> {
        let ran = BOOTSTRAP.call_once(|| {
            let _guard = InterceptGuard::suppress();
            let sink = self.sink.unwrap_or_else(sink::sink_from_env);
            *STATE.sink.write() = sink;
            if let Some(provider) = self.backtrace {
                *STATE.backtrace.write() = provider;
            }
            let filter = if self.ignored_frames.is_empty() && self.ignored_patterns.is_empty() {
                FrameFilter::from_env()
            } else {
                FrameFilter::new(&self.ignored_frames, &self.ignored_patterns)
            };
            *STATE.filter.write() = filter;
            announce();
        });
        if !ran {
            bail!("the verifier is already initialized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn latch_runs_exactly_once_across_threads() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        static LATCH: OnceLatch = OnceLatch::new();

        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| LATCH.call_once(|| { RUNS.fetch_add(1, Ordering::SeqCst); }))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
        assert_eq!(winners, 1);
        assert!(LATCH.is_complete());
    }

    #[test]
    fn latch_waiters_observe_completed_init() {
        static LATCH: OnceLatch = OnceLatch::new();
        assert!(!LATCH.is_complete());
        LATCH.call_once(|| {});
        assert!(LATCH.is_complete());
        // A second call neither reruns nor blocks.
        assert!(!LATCH.call_once(|| panic!("must not rerun")));
    }
}
