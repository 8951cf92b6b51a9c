//! `ps aux` parsing for simulator-related processes.

use super::{simulator_related, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command: String,
    pub simulator_related: bool,
}

/// Parse `ps aux` output, keeping only simulator-related entries.
///
/// Columns 0..10 are fixed (`USER PID %CPU %MEM VSZ RSS TT STAT STARTED
/// TIME`); everything from column 10 on is the command line, which may
/// itself contain spaces.
pub fn parse_ps_aux(text: &str) -> Result<Vec<ProcessRecord>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty("ps aux"));
    }
    let mut records = Vec::new();
    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 11 {
            continue;
        }
        let command = parts[10..].join(" ");
        if !simulator_related(&command) {
            continue;
        }
        let pid = parts[1].parse::<u32>().map_err(|_| ParseError::Malformed {
            what: "ps aux",
            detail: format!("non-numeric pid in line: {line}"),
        })?;
        records.push(ProcessRecord {
            pid,
            command,
            simulator_related: true,
        });
    }
    Ok(records)
}
