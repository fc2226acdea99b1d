//! Diagnostic sinks.
//!
//! A sink is where diagnostics go: standard streams, the system log, a
//! file, or a user callback. The hooks invoke the sink with no verifier
//! lock held and with interception suppressed; a sink is responsible for
//! its own thread-safety.
//!
//! The sink is chosen once at bootstrap, either programmatically through
//! the builder or from the `LKSMITH_LOG` environment variable:
//!
//! | value | target |
//! |---|---|
//! | `stderr` (default) | standard error |
//! | `stdout` | standard output |
//! | `syslog` | the system log |
//! | `file://PATH` | appended to `PATH` |
//! | `callback://0xADDR` | `extern "C" fn(code, msg)` at address `ADDR` |
//!
//! Anything unusable falls back to stderr with a complaint, so diagnostics
//! are never silently dropped over a configuration typo.

use crate::core::types::Diagnostic;
use anyhow::{Context, Result, anyhow, bail};
use parking_lot::Mutex;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::sync::Arc;

/// Output target for diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Deliver one diagnostic.
    fn report(&self, diag: &Diagnostic);

    /// Deliver an informational line that is not tied to a fault, such as
    /// the bootstrap notice.
    fn notice(&self, message: &str);
}

/// Signature of a C-side error callback: numeric fault code plus rendered
/// message.
pub type RawErrorCallback = unsafe extern "C" fn(code: c_int, msg: *const c_char);

fn render(diag: &Diagnostic) -> String {
    let mut out = format!("locksmith error {}: {}", diag.fault.code(), diag.message);
    for frame in &diag.frames {
        out.push_str("\n    ");
        out.push_str(frame);
    }
    out
}

/// Sink writing to standard error. The default.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn report(&self, diag: &Diagnostic) {
        eprintln!("{}", render(diag));
    }

    fn notice(&self, message: &str) {
        eprintln!("locksmith: {message}");
    }
}

/// Sink writing to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn report(&self, diag: &Diagnostic) {
        println!("{}", render(diag));
    }

    fn notice(&self, message: &str) {
        println!("locksmith: {message}");
    }
}

/// Sink appending lines to a file.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending.
    pub fn open(path: &PathBuf) -> Result<FileSink> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("unable to open log file {}", path.display()))?;
        Ok(FileSink {
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, line: &str) {
        let mut file = self.file.lock();
        // A failing log write has nowhere better to go.
        let _ = writeln!(file, "{line}");
        let _ = file.flush();
    }
}

impl DiagnosticSink for FileSink {
    fn report(&self, diag: &Diagnostic) {
        self.write_line(&render(diag));
    }

    fn notice(&self, message: &str) {
        self.write_line(&format!("locksmith: {message}"));
    }
}

/// Sink forwarding to the system log.
#[derive(Debug, Default)]
pub struct SyslogSink;

impl SyslogSink {
    fn send(&self, message: &str) {
        let Ok(msg) = CString::new(message.replace('\0', "?")) else {
            return;
        };
        unsafe {
            libc::syslog(libc::LOG_USER | libc::LOG_INFO, c"%s".as_ptr(), msg.as_ptr());
        }
    }
}

impl DiagnosticSink for SyslogSink {
    fn report(&self, diag: &Diagnostic) {
        self.send(&render(diag));
    }

    fn notice(&self, message: &str) {
        self.send(&format!("locksmith: {message}"));
    }
}

/// Sink invoking a Rust callback with the structured diagnostic.
///
/// Notices are not faults and are not forwarded.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(Diagnostic) + Send + Sync,
{
    pub fn new(callback: F) -> CallbackSink<F> {
        CallbackSink { callback }
    }
}

impl<F> DiagnosticSink for CallbackSink<F>
where
    F: Fn(Diagnostic) + Send + Sync,
{
    fn report(&self, diag: &Diagnostic) {
        (self.callback)(diag.clone());
    }

    fn notice(&self, _message: &str) {}
}

/// Sink invoking a C function pointer with `(code, message)`.
pub struct RawCallbackSink {
    callback: RawErrorCallback,
}

impl RawCallbackSink {
    pub fn new(callback: RawErrorCallback) -> RawCallbackSink {
        RawCallbackSink { callback }
    }

    fn send(&self, code: c_int, message: &str) {
        let Ok(msg) = CString::new(message.replace('\0', "?")) else {
            return;
        };
        unsafe { (self.callback)(code, msg.as_ptr()) }
    }
}

impl DiagnosticSink for RawCallbackSink {
    fn report(&self, diag: &Diagnostic) {
        self.send(diag.fault.code(), &render(diag));
    }

    fn notice(&self, message: &str) {
        self.send(0, message);
    }
}

/// Signature of a C-side report callback: one diagnostic, serialized as a
/// JSON document.
pub type RawReportCallback = unsafe extern "C" fn(json: *const c_char);

/// Sink invoking a C function pointer with each diagnostic rendered as
/// JSON, for embedders that want the structured form across the language
/// boundary.
///
/// Notices are not faults and are not forwarded.
pub struct JsonCallbackSink {
    callback: RawReportCallback,
}

impl JsonCallbackSink {
    pub fn new(callback: RawReportCallback) -> JsonCallbackSink {
        JsonCallbackSink { callback }
    }
}

impl DiagnosticSink for JsonCallbackSink {
    fn report(&self, diag: &Diagnostic) {
        let Ok(json) = serde_json::to_string(diag) else {
            return;
        };
        let Ok(msg) = CString::new(json) else {
            return;
        };
        unsafe { (self.callback)(msg.as_ptr()) }
    }

    fn notice(&self, _message: &str) {}
}

/// Parsed form of an `LKSMITH_LOG` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogTarget {
    Stderr,
    Stdout,
    Syslog,
    File(PathBuf),
    Callback(usize),
}

pub(crate) fn parse_log_target(value: &str) -> Result<LogTarget> {
    const FILE_PREFIX: &str = "file://";
    const CALLBACK_PREFIX: &str = "callback://";

    match value {
        "stderr" => Ok(LogTarget::Stderr),
        "stdout" => Ok(LogTarget::Stdout),
        "syslog" => Ok(LogTarget::Syslog),
        _ if value.starts_with(FILE_PREFIX) => {
            let path = &value[FILE_PREFIX.len()..];
            if path.is_empty() {
                bail!("empty log file path");
            }
            Ok(LogTarget::File(PathBuf::from(path)))
        }
        _ if value.starts_with(CALLBACK_PREFIX) => {
            let addr = &value[CALLBACK_PREFIX.len()..];
            let digits = addr
                .strip_prefix("0x")
                .ok_or_else(|| anyhow!("callback address '{addr}' must begin with 0x"))?;
            let addr = usize::from_str_radix(digits, 16)
                .with_context(|| format!("unable to parse callback address '0x{digits}'"))?;
            if addr == 0 {
                bail!("callback address is null");
            }
            Ok(LogTarget::Callback(addr))
        }
        other => Err(anyhow!("unable to understand log target '{other}'")),
    }
}

/// Build the sink described by the `LKSMITH_LOG` environment variable.
///
/// Every failure path lands on stderr, with a complaint explaining why.
pub(crate) fn sink_from_env() -> Arc<dyn DiagnosticSink> {
    let value = match std::env::var("LKSMITH_LOG") {
        Ok(value) => value,
        Err(_) => return Arc::new(StderrSink),
    };
    let target = match parse_log_target(&value) {
        Ok(target) => target,
        Err(err) => {
            eprintln!("locksmith: {err}; redirecting output to stderr");
            return Arc::new(StderrSink);
        }
    };
    match target {
        LogTarget::Stderr => Arc::new(StderrSink),
        LogTarget::Stdout => Arc::new(StdoutSink),
        LogTarget::Syslog => Arc::new(SyslogSink),
        LogTarget::File(path) => match FileSink::open(&path) {
            Ok(sink) => Arc::new(sink),
            Err(err) => {
                eprintln!("locksmith: {err}; redirecting output to stderr");
                Arc::new(StderrSink)
            }
        },
        LogTarget::Callback(addr) => {
            // The embedder asserted there is a function of the right
            // signature at this address; nothing more can be checked.
            let callback: RawErrorCallback = unsafe { std::mem::transmute(addr) };
            Arc::new(RawCallbackSink::new(callback))
        }
    }
}
