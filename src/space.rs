//! Space accounting.
//!
//! The authoritative reclaimed-space figure comes from two APFS container
//! captures (before and after cleanup). `df` usage is kept only as a
//! display fallback when the container metric cannot be read; it never
//! participates in the reclaimed-space computation.

use std::time::Duration;

use crate::parse::apfs::{self, ApfsMetrics, DATA_MOUNT_POINT};
use crate::parse::ParseError;
use crate::runner::{CommandRunner, CommandSpec};

const MEASURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Filesystem usage from `df -k`. Display-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

/// Capture the current free capacity of the Data volume's APFS container.
pub fn measure<R: CommandRunner>(runner: &R) -> Result<ApfsMetrics, ParseError> {
    let result = runner.run(
        CommandSpec::new("diskutil", &["apfs", "list", "-plist"]).with_timeout(MEASURE_TIMEOUT),
    );
    if !result.success() {
        return Err(ParseError::MetricUnavailable);
    }
    apfs::parse_not_allocated(&result.stdout_bytes, DATA_MOUNT_POINT)
}

/// Display-only fallback when the container metric is unavailable.
pub fn df_stats<R: CommandRunner>(runner: &R, path: &str) -> Option<DfStats> {
    let result = runner.run(CommandSpec::new("df", &["-k", path]).with_timeout(MEASURE_TIMEOUT));
    if !result.success() {
        return None;
    }
    parse_df_output(&result.stdout)
}

/// Parse `df -k` output. The last line is used because long device names
/// wrap the first data row.
pub fn parse_df_output(text: &str) -> Option<DfStats> {
    let line = text.lines().filter(|line| !line.trim().is_empty()).last()?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let blocks: u64 = parts[1].parse().ok()?;
    let used: u64 = parts[2].parse().ok()?;
    let available: u64 = parts[3].parse().ok()?;
    Some(DfStats {
        total_bytes: blocks * 1024,
        used_bytes: used * 1024,
        available_bytes: available * 1024,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_df_reads_kilobyte_columns_from_last_line() {
        let text = "\
Filesystem    1024-blocks      Used Available Capacity  Mounted on
/dev/disk3s5    482797652 101234567 311563085    25%    /System/Volumes/Data
";
        let stats = parse_df_output(text).expect("parse");
        assert_eq!(stats.total_bytes, 482_797_652 * 1024);
        assert_eq!(stats.used_bytes, 101_234_567 * 1024);
        assert_eq!(stats.available_bytes, 311_563_085 * 1024);
    }

    #[test]
    fn parse_df_uses_last_line_when_device_name_wraps() {
        let text = "\
Filesystem 1024-blocks Used Available Capacity Mounted on
/dev/very-long-device-name-that-wraps
           1000 400 600 40% /System/Volumes/Data
";
        let stats = parse_df_output(text).expect("parse");
        assert_eq!(stats.available_bytes, 600 * 1024);
    }

    #[test]
    fn parse_df_rejects_header_only_and_short_rows() {
        assert_eq!(parse_df_output("Filesystem 1024-blocks Used Available\n"), None);
        assert_eq!(parse_df_output(""), None);
        assert_eq!(parse_df_output("/dev/disk3s5 abc def ghi\n"), None);
    }
}
