use std::io::{self, Write};

use humansize::{format_size, DECIMAL};
use owo_colors::OwoColorize;

use crate::parse::diskutil::DiskRecord;
use crate::parse::ps::ProcessRecord;
use crate::parse::runtimes::RuntimeRecord;
use crate::report::{self, CleanupReport, StepResult};

fn write_steps(out: &mut impl Write, steps: &[StepResult]) {
    writeln!(out).ok();
    for step in steps {
        if step.ok() {
            writeln!(out, "  {} {}", "\u{2713}".green(), step.label).ok();
        } else if !step.required {
            writeln!(
                out,
                "  {} {} {}",
                "\u{2717}".yellow(),
                step.label,
                "(optional)".dimmed(),
            )
            .ok();
        } else {
            let detail = step.failure_message().unwrap_or_default();
            writeln!(out, "  {} {}", "\u{2717}".red(), detail).ok();
        }
    }
    writeln!(out).ok();
}

/// Print step lines and a PASS/FAIL verdict with no space accounting.
/// Returns true iff every required step succeeded.
pub fn print_steps(steps: &[StepResult]) -> bool {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    write_steps(&mut out, steps);
    let ok = report::commands_ok(steps);
    if ok {
        writeln!(out, "  {}", "PASS".green().bold()).ok();
    } else {
        writeln!(
            out,
            "  {} {}",
            "FAIL".red().bold(),
            report::first_required_failure(steps).unwrap_or_default().dimmed(),
        )
        .ok();
    }
    writeln!(out).ok();
    ok
}

/// Print the per-step and summary report for one cleanup operation.
/// Returns true iff every required step succeeded.
pub fn print_report(report: &CleanupReport) -> bool {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    write_steps(&mut out, &report.steps);
    if report.cancelled {
        writeln!(
            out,
            "  {} {}",
            "CANCELLED".yellow().bold(),
            format!("({} steps completed)", report.steps.len()).dimmed(),
        )
        .ok();
        writeln!(out).ok();
        return false;
    }

    if report.commands_ok {
        let mode = if report.manual_mode { "  (manual mode)" } else { "" };
        writeln!(out, "  {}{}", "PASS".green().bold(), mode.dimmed()).ok();
    } else {
        writeln!(
            out,
            "  {} {}",
            "FAIL".red().bold(),
            report.error.as_deref().unwrap_or("required step failed").dimmed(),
        )
        .ok();
    }

    // Reclaimed space is only claimed when the steps succeeded AND the
    // container metric actually moved; anything else would be a guess.
    match report.space.space_ok() {
        Some(true) if report.commands_ok => {
            writeln!(
                out,
                "  {} {}",
                "Reclaimed:".bold(),
                format_size(report.space.reclaimed_bytes(), DECIMAL).green(),
            )
            .ok();
        }
        Some(_) => {
            writeln!(out, "  {}", "No space reclaimed.".dimmed()).ok();
        }
        None => {
            writeln!(out, "  {}", "Space delta unavailable (APFS metric missing).".dimmed()).ok();
            if let Some(df) = &report.space.fallback_display {
                writeln!(
                    out,
                    "  {}",
                    format!(
                        "df: {} free of {}",
                        format_size(df.available_bytes, DECIMAL),
                        format_size(df.total_bytes, DECIMAL),
                    )
                    .dimmed(),
                )
                .ok();
            }
        }
    }
    writeln!(out).ok();

    report.commands_ok
}

/// Print the read-only scan: mounted simulator disks, registered runtimes,
/// running simulator processes.
pub fn print_scan(
    disks: &[DiskRecord],
    runtimes: Option<&[RuntimeRecord]>,
    processes: &[ProcessRecord],
) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out).ok();
    writeln!(out, "  {}", "Simulator disks".bold()).ok();
    if disks.is_empty() {
        writeln!(out, "    {}", "none mounted".dimmed()).ok();
    }
    for disk in disks {
        let mount = disk.mount_point.as_deref().unwrap_or("-");
        writeln!(
            out,
            "    {:<10} {:<30} {:>10}  {}",
            disk.device,
            disk.volume_name,
            format_size(disk.size_bytes, DECIMAL),
            mount.dimmed(),
        )
        .ok();
    }

    writeln!(out).ok();
    writeln!(out, "  {}", "Registered runtimes".bold()).ok();
    match runtimes {
        None => {
            writeln!(out, "    {}", "simctl unavailable".dimmed()).ok();
        }
        Some([]) => {
            writeln!(out, "    {}", "none".dimmed()).ok();
        }
        Some(records) => {
            for runtime in records {
                writeln!(
                    out,
                    "    {:<20} {:<10} {:>10}  {}",
                    runtime.name,
                    runtime.build,
                    format_size(runtime.size_bytes, DECIMAL),
                    runtime.state.dimmed(),
                )
                .ok();
            }
        }
    }

    writeln!(out).ok();
    writeln!(out, "  {}", "Simulator processes".bold()).ok();
    if processes.is_empty() {
        writeln!(out, "    {}", "none running".dimmed()).ok();
    }
    for process in processes {
        writeln!(out, "    {:<8} {}", process.pid, process.command.dimmed()).ok();
    }
    writeln!(out).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{SpaceReport, StepResult};
    use crate::runner::{CommandResult, CommandSpec};

    fn passing_step(label: &str) -> StepResult {
        StepResult::completed(
            label,
            CommandResult {
                spec: CommandSpec::new("true", &[]),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                stdout_bytes: Vec::new(),
                stderr_bytes: Vec::new(),
                timed_out: false,
            },
        )
    }

    fn report_with(commands_ok: bool, steps: Vec<StepResult>) -> CleanupReport {
        CleanupReport {
            commands_ok,
            space: SpaceReport::default(),
            steps,
            manual_mode: false,
            cancelled: false,
            error: None,
        }
    }

    #[test]
    fn passing_report_returns_true() {
        assert!(print_report(&report_with(true, vec![passing_step("shutdown")])));
    }

    #[test]
    fn failing_report_returns_false() {
        assert!(!print_report(&report_with(false, vec![passing_step("shutdown")])));
    }

    #[test]
    fn cancelled_report_returns_false() {
        let report = CleanupReport::cancelled_with(vec![passing_step("shutdown")]);
        assert!(!print_report(&report));
    }
}
