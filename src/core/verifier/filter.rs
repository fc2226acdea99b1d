//! Frame filter: suppressing dependency analysis for known-noisy call sites.
//!
//! Some code is wrong on purpose: test fixtures that exercise inversions,
//! third-party libraries with a known-benign ordering quirk. The filter
//! holds a set of exact frame symbols and a list of glob patterns; when any
//! frame of an acquisition's backtrace matches, the dependency update for
//! that acquisition is skipped. Holder bookkeeping still happens, so the
//! matching acquisition unwinds normally on release.

use glob::Pattern;

/// Ignore configuration, loaded once at bootstrap.
#[derive(Debug, Default)]
pub struct FrameFilter {
    /// Exact symbol names, sorted for binary search.
    exact: Vec<String>,
    /// fnmatch-style patterns.
    patterns: Vec<Pattern>,
}

impl FrameFilter {
    /// Build a filter from exact names and glob pattern sources.
    ///
    /// Unparsable patterns are dropped with a complaint on stderr rather
    /// than failing the whole configuration; a typo in one pattern should
    /// not turn the filter off.
    pub fn new<S: AsRef<str>>(exact: &[S], patterns: &[S]) -> FrameFilter {
        let mut exact: Vec<String> = exact.iter().map(|s| s.as_ref().to_owned()).collect();
        exact.sort();
        exact.dedup();
        let patterns = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    eprintln!(
                        "locksmith: ignoring bad frame pattern '{}': {err}",
                        p.as_ref()
                    );
                    None
                }
            })
            .collect();
        FrameFilter { exact, patterns }
    }

    /// Load the filter from `LKSMITH_IGNORED_FRAMES` and
    /// `LKSMITH_IGNORED_FRAME_PATTERNS`, both colon-separated.
    pub fn from_env() -> FrameFilter {
        let frames = split_env("LKSMITH_IGNORED_FRAMES");
        let patterns = split_env("LKSMITH_IGNORED_FRAME_PATTERNS");
        FrameFilter::new(&frames, &patterns)
    }

    /// Whether any frame of `frames` is ignored, exactly or by pattern.
    pub fn matches(&self, frames: &[String]) -> bool {
        frames.iter().any(|frame| {
            self.exact.binary_search(frame).is_ok()
                || self.patterns.iter().any(|p| p.matches(frame))
        })
    }

    /// The exact frame names, in sorted order.
    pub fn exact_frames(&self) -> &[String] {
        &self.exact
    }

    /// The pattern sources, in configuration order.
    pub fn pattern_sources(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_owned()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

fn split_env(name: &str) -> Vec<String> {
    match std::env::var(name) {
        Ok(value) => value
            .split(':')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Err(_) => Vec::new(),
    }
}
