use locksmith::{BacktraceProvider, Diagnostic, DiagnosticSink, Fault, Locksmith};
use std::cell::RefCell;
use std::sync::{Arc, Mutex as StdMutex};

/// Sink that records every diagnostic for later assertions.
pub struct RecordingSink {
    records: Arc<StdMutex<Vec<Diagnostic>>>,
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diag: &Diagnostic) {
        self.records.lock().unwrap().push(diag.clone());
    }

    fn notice(&self, _message: &str) {}
}

thread_local! {
    static SCRIPTED_FRAMES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Backtrace provider that returns whatever frames the current test thread
/// scripted, so frame-filter behavior is deterministic.
pub struct ScriptedBacktrace;

impl BacktraceProvider for ScriptedBacktrace {
    fn capture(&self) -> Vec<String> {
        SCRIPTED_FRAMES.with(|f| f.borrow().clone())
    }
}

/// Script the frames the provider reports for this thread.
#[allow(dead_code)]
pub fn set_frames(frames: &[&str]) {
    SCRIPTED_FRAMES.with(|f| {
        *f.borrow_mut() = frames.iter().map(|s| (*s).to_owned()).collect();
    });
}

pub struct Harness {
    records: Arc<StdMutex<Vec<Diagnostic>>>,
}

#[allow(dead_code)]
impl Harness {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.records.lock().unwrap().clone()
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.diagnostics().iter().map(|d| d.fault).collect()
    }

    pub fn count_of(&self, fault: Fault) -> usize {
        self.faults().iter().filter(|&&f| f == fault).count()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    pub fn assert_clean(&self) {
        let faults = self.faults();
        assert!(faults.is_empty(), "unexpected diagnostics: {faults:?}");
    }
}

/// Initialize the verifier with a recording sink and scripted backtraces.
pub fn start_verifier() -> Harness {
    start_verifier_with(|builder| builder)
}

/// Same as [`start_verifier`], with extra builder configuration applied.
pub fn start_verifier_with(configure: impl FnOnce(Locksmith) -> Locksmith) -> Harness {
    let records = Arc::new(StdMutex::new(Vec::new()));
    let builder = Locksmith::new()
        .sink(Arc::new(RecordingSink {
            records: Arc::clone(&records),
        }))
        .backtrace_provider(Arc::new(ScriptedBacktrace));
    configure(builder)
        .init()
        .expect("verifier already initialized in this process");
    Harness { records }
}
