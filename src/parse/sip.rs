//! `csrutil status` parsing.
//!
//! System Integrity Protection decides whether the system-level runtime
//! stores can be deleted at all; the raw status line is kept for the
//! operator because csrutil's wording varies across macOS releases.

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipStatus {
    /// `None` when the status line matched neither enabled nor disabled.
    pub enabled: Option<bool>,
    pub raw: String,
}

pub fn parse_sip_status(text: &str) -> Result<SipStatus, ParseError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(ParseError::Empty("csrutil status"));
    }
    let lowered = raw.to_lowercase();
    let enabled = if lowered.contains("enabled") {
        Some(true)
    } else if lowered.contains("disabled") {
        Some(false)
    } else {
        None
    };
    Ok(SipStatus {
        enabled,
        raw: raw.to_string(),
    })
}
