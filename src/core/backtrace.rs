//! The backtrace-provider boundary.
//!
//! Stack capture is a collaborator, not part of the verifier: the hooks ask
//! the installed provider for an ordered sequence of symbolic frames and
//! feed them to the frame filter and the holder ledger. Capture always
//! happens with interception suppressed, so a provider is free to allocate
//! or to take locks of its own.

use std::backtrace::Backtrace;

/// Source of symbolic stack frames for the current thread.
pub trait BacktraceProvider: Send + Sync {
    /// Capture the calling thread's stack as symbol names, innermost first.
    /// An empty vector is a valid answer; it simply disables frame
    /// filtering and leaves holder entries without context.
    fn capture(&self) -> Vec<String>;
}

/// Default provider, backed by the standard library's backtrace support.
///
/// Frame quality follows the build: with symbols stripped the frames
/// degrade to addresses, which still satisfies the holder ledger but makes
/// the frame filter useless.
#[derive(Debug, Default)]
pub struct StdBacktraceProvider;

impl BacktraceProvider for StdBacktraceProvider {
    fn capture(&self) -> Vec<String> {
        let rendered = Backtrace::force_capture().to_string();
        rendered
            .lines()
            .filter_map(|line| {
                // Frame lines render as "  N: symbol"; location lines
                // ("at src/file.rs:12") carry no symbol and are dropped.
                let line = line.trim_start();
                let (index, symbol) = line.split_once(": ")?;
                index.parse::<u32>().ok()?;
                Some(symbol.trim().to_owned())
            })
            .collect()
    }
}

/// Provider that captures nothing. Useful when the overhead of capture is
/// unwanted and holder context is not needed.
#[derive(Debug, Default)]
pub struct NoBacktraceProvider;

impl BacktraceProvider for NoBacktraceProvider {
    fn capture(&self) -> Vec<String> {
        Vec::new()
    }
}
