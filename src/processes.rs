//! Simulator process listing and termination.
//!
//! CoreSimulator is supervised by launchd: killing its processes without
//! first booting the service out just respawns them. `kill_all` therefore
//! stops the launch agent before the pkill/killall sweep.

use std::time::Duration;

use crate::parse::ps::{self, ProcessRecord};
use crate::report::StepResult;
use crate::runner::{CommandRunner, CommandSpec};

const KILL_TIMEOUT: Duration = Duration::from_secs(10);

const CORESIM_SERVICE: &str = "com.apple.CoreSimulator.CoreSimulatorService";

/// List running simulator-related processes. Errors degrade to an empty
/// list; process listing is advisory, not a cleanup step.
pub fn list<R: CommandRunner>(runner: &R) -> Vec<ProcessRecord> {
    let result = runner.run(CommandSpec::new("ps", &["aux"]).with_timeout(KILL_TIMEOUT));
    if !result.success() {
        return Vec::new();
    }
    ps::parse_ps_aux(&result.stdout).unwrap_or_default()
}

/// Terminate the given processes one by one. Failures (already exited,
/// permission denied) are recorded per process; no failure stops the
/// remaining attempts.
pub fn terminate<R: CommandRunner>(runner: &R, records: &[ProcessRecord]) -> Vec<StepResult> {
    records
        .iter()
        .map(|record| {
            let pid = record.pid.to_string();
            let spec = CommandSpec::new("kill", &["-9", &pid]).with_timeout(KILL_TIMEOUT);
            let label = format!("kill -9 {pid} ({})", short_name(&record.command));
            StepResult::completed(label, runner.run(spec)).optional()
        })
        .collect()
}

/// Stop the CoreSimulator launch agent, then kill every simulator-related
/// process. All steps are optional: on a machine with nothing running every
/// one of them "fails" harmlessly.
pub fn kill_all<R: CommandRunner>(runner: &R) -> Vec<StepResult> {
    let mut steps = Vec::new();

    let uid = unsafe { libc::getuid() };
    let gui_scope = format!("gui/{uid}/{CORESIM_SERVICE}");
    for args in [vec!["bootout", gui_scope.as_str()], vec!["remove", CORESIM_SERVICE]] {
        let spec = CommandSpec::new("launchctl", &args).with_timeout(KILL_TIMEOUT);
        let label = spec.display();
        steps.push(StepResult::completed(label, runner.run(spec)).optional());
    }

    let sweeps: &[&[&str]] = &[
        &["pkill", "-9", "-f", "Simulator"],
        &["pkill", "-9", "-f", "CoreSimulator"],
        &["pkill", "-9", "-f", "SimulatorTrampoline"],
        &["pkill", "-9", "-f", "launchd_sim"],
        &["killall", "-9", CORESIM_SERVICE],
        &["pkill", "-9", "-x", "Xcode"],
    ];
    for sweep in sweeps {
        let spec = CommandSpec::new(sweep[0], &sweep[1..]).with_timeout(KILL_TIMEOUT);
        let label = spec.display();
        steps.push(StepResult::completed(label, runner.run(spec)).optional());
    }
    steps
}

fn short_name(command: &str) -> &str {
    let executable = command.split_whitespace().next().unwrap_or(command);
    executable.rsplit('/').next().unwrap_or(executable)
}
