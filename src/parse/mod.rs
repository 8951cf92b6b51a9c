//! Pure parsers over raw command output.
//!
//! No I/O here: every function takes the captured text or bytes of a
//! [`crate::runner::CommandResult`] and returns typed records or a
//! [`ParseError`]. Malformed or empty input is an explicit error, never an
//! empty success — an empty success would be indistinguishable from
//! "nothing found".

pub mod apfs;
pub mod diskutil;
pub mod ps;
pub mod runtimes;
pub mod sip;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty output from {0}")]
    Empty(&'static str),
    #[error("malformed {what} output: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("APFS capacity metric unavailable")]
    MetricUnavailable,
}

/// Substrings that mark a volume, mount point, or process as belonging to
/// the Xcode Simulator stack.
pub const SIMULATOR_KEYWORDS: &[&str] = &[
    "Simulator",
    "Xcode",
    "CoreSimulator",
    "iOS",
    "watchOS",
    "tvOS",
    "xrOS",
];

pub(crate) fn simulator_related(text: &str) -> bool {
    SIMULATOR_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}
