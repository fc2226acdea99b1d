mod backtrace;
mod context;
mod graph;
mod registry;
mod sink;
mod sorted_set;
mod types;
mod verifier;

// Re-export the public surface
pub use backtrace::{BacktraceProvider, NoBacktraceProvider, StdBacktraceProvider};
pub use sink::{
    CallbackSink, DiagnosticSink, FileSink, JsonCallbackSink, RawCallbackSink, RawErrorCallback,
    RawReportCallback, StderrSink, StdoutSink, SyslogSink,
};
pub use types::*;
pub use verifier::hooks;
pub use verifier::{Locksmith, ignored_frame_patterns, ignored_frames};

pub(crate) use verifier::replace_sink;
