//! Cleanup orchestration.
//!
//! One state machine drives every destructive operation. Steps run strictly
//! in sequence, each one becomes a [`StepResult`], and nothing aborts the
//! remaining independent steps; a failure flips `commands_ok` and is named
//! in the final report. Elevation and command exit codes are treated as
//! claims, not facts: runtime deletion and unmounting both re-verify the
//! resulting state before calling a step done.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::devtools;
use crate::disks;
use crate::parse::diskutil::DiskRecord;
use crate::parse::ps::ProcessRecord;
use crate::parse::runtimes::{self, RuntimeRecord};
use crate::parse::ParseError;
use crate::paths;
use crate::processes;
use crate::report::{self, CleanupReport, SpaceReport, StepResult};
use crate::runner::{CommandRunner, CommandSpec};
use crate::space::{self, DfStats};

const SIMCTL_TIMEOUT: Duration = Duration::from_secs(30);
const RUNTIME_DELETE_TIMEOUT: Duration = Duration::from_secs(120);
const REMOVE_TIMEOUT: Duration = Duration::from_secs(120);
const SUDO_BATCH_TIMEOUT: Duration = Duration::from_secs(180);

const CORESIM_SERVICE: &str = "com.apple.CoreSimulator.CoreSimulatorService";

/// Where the orchestrator currently is. Surfaced through the phase observer
/// so the presentation layer can show progress without sharing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Detecting,
    PrimaryPath,
    ManualPath,
    Verifying,
    Reporting,
    Cancelled,
}

impl Phase {
    pub fn describe(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Detecting => "detecting developer tools",
            Phase::PrimaryPath => "cleaning via simctl",
            Phase::ManualPath => "cleaning user-space directories",
            Phase::Verifying => "verifying reclaimed space",
            Phase::Reporting => "preparing report",
            Phase::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpaceOptions {
    /// Permit the single elevated batch that removes system-level runtime
    /// backing stores. Without it the operation stays user-space.
    pub system_level_authorized: bool,
    /// Permit falling back to manual user-space cleanup when simctl is
    /// unusable. The fallback still needs a confirmation at run time.
    pub allow_manual_fallback: bool,
    /// Stop simulator processes before deleting anything.
    pub stop_processes: bool,
}

impl Default for FreeSpaceOptions {
    fn default() -> Self {
        Self {
            system_level_authorized: false,
            allow_manual_fallback: true,
            stop_processes: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("another cleanup operation is already running")]
    Busy,
    /// No destructive command is resolvable and the manual fallback was
    /// disallowed. The only error raised before any destructive action.
    #[error("developer tools unavailable: {0}")]
    ToolsUnavailable(String),
}

/// Drives one cleanup operation at a time over an injected runner.
pub struct Orchestrator<R: CommandRunner> {
    runner: R,
    cancel: Arc<AtomicBool>,
    busy: AtomicBool,
    observer: Option<Box<dyn Fn(Phase) + Send + Sync>>,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            cancel: Arc::new(AtomicBool::new(false)),
            busy: AtomicBool::new(false),
            observer: None,
        }
    }

    /// Flag checked at every step boundary. Hand this to a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn on_phase(&mut self, observer: impl Fn(Phase) + Send + Sync + 'static) {
        self.observer = Some(Box::new(observer));
    }

    fn emit(&self, phase: Phase) {
        log::info!("phase: {}", phase.describe());
        if let Some(observer) = &self.observer {
            observer(phase);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, CleanupError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(CleanupError::Busy);
        }
        Ok(BusyGuard(&self.busy))
    }

    /// List mounted simulator disks without touching anything.
    pub fn scan(&self) -> Result<Vec<DiskRecord>, ParseError> {
        disks::scan(&self.runner)
    }

    /// List running simulator-related processes.
    pub fn processes(&self) -> Vec<ProcessRecord> {
        processes::list(&self.runner)
    }

    /// List registered simulator runtimes.
    pub fn runtimes(&self) -> Result<Vec<RuntimeRecord>, ParseError> {
        let env = devtools::simctl_env(&self.runner);
        let (records, step) = self.list_runtime_records(&env);
        records.ok_or_else(|| match step.outcome {
            report::StepOutcome::Parse(error) => error,
            report::StepOutcome::Completed(result) => ParseError::Malformed {
                what: "simctl runtime list",
                detail: result.stderr.trim().to_string(),
            },
            report::StepOutcome::Verification(detail) => ParseError::Malformed {
                what: "simctl runtime list",
                detail,
            },
        })
    }

    /// Unmount the named disks (slice ids accepted) and verify they are gone.
    pub fn eject_selected(&self, disk_ids: &[String]) -> Result<Vec<StepResult>, CleanupError> {
        let _guard = self.acquire()?;
        Ok(disks::unmount(&self.runner, disk_ids))
    }

    /// The main cleanup flow. `confirm_manual` is consulted once, and only
    /// when simctl is unusable and the manual fallback is permitted.
    pub fn free_runtime_space(
        &self,
        options: &FreeSpaceOptions,
        confirm_manual: impl FnOnce(&str) -> bool,
    ) -> Result<CleanupReport, CleanupError> {
        let _guard = self.acquire()?;
        self.emit(Phase::Detecting);

        let (before, fallback_display) = self.capture_before();
        let status = devtools::check(&self.runner, options.allow_manual_fallback);
        let env = status.simctl_env.clone();

        if !status.simctl_available {
            if !options.allow_manual_fallback {
                return Err(CleanupError::ToolsUnavailable(status.detail));
            }
            if !confirm_manual(&status.detail) {
                self.emit(Phase::Cancelled);
                return Ok(CleanupReport::cancelled_with(Vec::new()));
            }
            return Ok(self.manual_path(before, fallback_display));
        }

        self.emit(Phase::PrimaryPath);
        let mut steps = Vec::new();

        if options.stop_processes {
            let running = processes::list(&self.runner);
            steps.extend(processes::terminate(&self.runner, &running));
        }
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        steps.push(self.simctl_step(&env, &["shutdown", "all"], SIMCTL_TIMEOUT));
        steps.push(self.simctl_step(&env, &["delete", "unavailable"], SIMCTL_TIMEOUT));
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        self.delete_runtimes(&env, &mut steps);
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        self.unmount_simulator_disks(&mut steps);
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        if options.system_level_authorized {
            self.remove_system_backing_stores(&mut steps);
        }

        Ok(self.finish(steps, before, fallback_display, false))
    }

    /// Scorched-earth variant: everything `free_runtime_space` does plus
    /// device data, profiles, caches, and the CoreSimulator launch agent.
    pub fn nuclear(&self) -> Result<CleanupReport, CleanupError> {
        let _guard = self.acquire()?;
        self.emit(Phase::Detecting);

        let (before, fallback_display) = self.capture_before();
        let env = devtools::simctl_env(&self.runner);

        self.emit(Phase::PrimaryPath);
        let mut steps = Vec::new();

        steps.extend(processes::kill_all(&self.runner));
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        steps.push(self.simctl_step(&env, &["shutdown", "all"], SIMCTL_TIMEOUT));
        steps.push(self.simctl_step(&env, &["delete", "all"], SIMCTL_TIMEOUT));
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        steps.push(self.remove_path_step(&paths::user_device_data()));
        steps.push(self.remove_path_step(&paths::user_profiles()));
        for path in paths::user_cache_paths() {
            steps.push(self.remove_path_step(&path));
        }
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        // Bootout and disable in one elevated batch so the agent cannot
        // resurrect the service mid-cleanup. One authorization dialog.
        let uid = unsafe { libc::getuid() };
        let gui_scope = format!("gui/{uid}/{CORESIM_SERVICE}");
        let batch = CommandSpec::sudo_batch(
            &[
                vec!["launchctl".to_string(), "bootout".to_string(), gui_scope.clone()],
                vec!["launchctl".to_string(), "disable".to_string(), gui_scope],
            ],
            SUDO_BATCH_TIMEOUT,
        );
        steps.push(StepResult::completed("disable CoreSimulator service", self.runner.run(batch)).optional());
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        self.delete_runtimes(&env, &mut steps);
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        self.unmount_simulator_disks(&mut steps);
        if self.cancelled() {
            return Ok(self.cancelled_report(steps));
        }

        self.remove_system_backing_stores(&mut steps);

        Ok(self.finish(steps, before, fallback_display, false))
    }

    /// Fallback cleanup when simctl is unusable. User-space only, no
    /// elevation ever, regardless of what else is configured.
    fn manual_path(
        &self,
        before: Option<crate::parse::apfs::ApfsMetrics>,
        fallback_display: Option<DfStats>,
    ) -> CleanupReport {
        self.emit(Phase::ManualPath);
        let mut steps = Vec::new();

        steps.extend(processes::kill_all(&self.runner));
        if self.cancelled() {
            return self.cancelled_report(steps);
        }

        self.unmount_simulator_disks(&mut steps);
        if self.cancelled() {
            return self.cancelled_report(steps);
        }

        for path in paths::manual_cleanup_paths() {
            debug_assert!(!paths::is_system_level(&path));
            steps.push(self.remove_path_step(&path));
            if self.cancelled() {
                return self.cancelled_report(steps);
            }
        }

        self.finish(steps, before, fallback_display, true)
    }

    fn capture_before(
        &self,
    ) -> (Option<crate::parse::apfs::ApfsMetrics>, Option<DfStats>) {
        let before = space::measure(&self.runner).ok();
        let fallback = if before.is_none() {
            log::warn!("APFS container metric unavailable, keeping df snapshot for display");
            space::df_stats(&self.runner, "/")
        } else {
            None
        };
        (before, fallback)
    }

    fn finish(
        &self,
        steps: Vec<StepResult>,
        before: Option<crate::parse::apfs::ApfsMetrics>,
        fallback_display: Option<DfStats>,
        manual_mode: bool,
    ) -> CleanupReport {
        self.emit(Phase::Verifying);
        let after = space::measure(&self.runner).ok();

        self.emit(Phase::Reporting);
        let commands_ok = report::commands_ok(&steps);
        let error = if commands_ok { None } else { report::first_required_failure(&steps) };
        let report = CleanupReport {
            commands_ok,
            space: SpaceReport { before, after, fallback_display },
            steps,
            manual_mode,
            cancelled: false,
            error,
        };
        self.emit(Phase::Idle);
        report
    }

    fn cancelled_report(&self, steps: Vec<StepResult>) -> CleanupReport {
        self.emit(Phase::Cancelled);
        CleanupReport::cancelled_with(steps)
    }

    fn simctl_spec(&self, env: &[(String, String)], args: &[&str], timeout: Duration) -> CommandSpec {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("simctl");
        full.extend_from_slice(args);
        CommandSpec::new("xcrun", &full).with_timeout(timeout).with_env(env)
    }

    fn simctl_step(&self, env: &[(String, String)], args: &[&str], timeout: Duration) -> StepResult {
        let spec = self.simctl_spec(env, args, timeout);
        let label = spec.display();
        StepResult::completed(label, self.runner.run(spec))
    }

    fn list_runtime_records(
        &self,
        env: &[(String, String)],
    ) -> (Option<Vec<RuntimeRecord>>, StepResult) {
        let spec = self.simctl_spec(env, &["runtime", "list", "-j"], SIMCTL_TIMEOUT);
        let label = spec.display();
        let result = self.runner.run(spec);
        if !result.success() {
            return (None, StepResult::completed(label, result));
        }
        match runtimes::parse_runtime_list(&result.stdout) {
            Ok(records) => (Some(records), StepResult::completed(label, result)),
            Err(error) => (None, StepResult::parse_failure(label, error)),
        }
    }

    /// Unregister every simulator runtime and verify against the registry,
    /// not the delete command's exit code.
    fn delete_runtimes(&self, env: &[(String, String)], steps: &mut Vec<StepResult>) {
        let (registered, step) = self.list_runtime_records(env);
        steps.push(step);
        let Some(registered) = registered else { return };
        if registered.is_empty() {
            return;
        }

        // Bulk delete first; per-id deletes mop up whatever survives.
        steps.push(
            self.simctl_step(env, &["runtime", "delete", "all"], RUNTIME_DELETE_TIMEOUT)
                .optional(),
        );

        let (remaining, step) = self.list_runtime_records(env);
        steps.push(step);
        let Some(remaining) = remaining else { return };
        if remaining.is_empty() {
            return;
        }
        for record in &remaining {
            steps.push(self.simctl_step(
                env,
                &["runtime", "delete", record.identifier.as_str()],
                RUNTIME_DELETE_TIMEOUT,
            ));
        }

        let (surviving, step) = self.list_runtime_records(env);
        steps.push(step);
        let Some(surviving) = surviving else { return };
        let stuck: Vec<&str> = surviving
            .iter()
            .filter(|record| registered.iter().any(|r| r.identifier == record.identifier))
            .map(|record| record.identifier.as_str())
            .collect();
        if !stuck.is_empty() {
            steps.push(StepResult::verification_failure(
                "verify runtime removal",
                format!("still registered after delete: {}", stuck.join(", ")),
            ));
        }
    }

    fn unmount_simulator_disks(&self, steps: &mut Vec<StepResult>) {
        match disks::scan(&self.runner) {
            Ok(records) if records.is_empty() => {}
            Ok(records) => {
                let devices: Vec<String> =
                    records.iter().map(|record| record.device.clone()).collect();
                steps.extend(disks::unmount(&self.runner, &devices));
            }
            Err(error) => steps.push(StepResult::parse_failure("scan simulator disks", error)),
        }
    }

    fn remove_path_step(&self, path: &Path) -> StepResult {
        let path = path.to_string_lossy();
        let spec = CommandSpec::new("rm", &["-rf", path.as_ref()]).with_timeout(REMOVE_TIMEOUT);
        let label = spec.display();
        StepResult::completed(label, self.runner.run(spec))
    }

    /// ONE elevated batch over the system volume/cryptex catalog: one
    /// authorization dialog no matter how many runtime volumes exist.
    fn remove_system_backing_stores(&self, steps: &mut Vec<StepResult>) {
        let targets = paths::system_runtime_paths();
        if targets.is_empty() {
            return;
        }
        if let Some(status) = devtools::sip_status(&self.runner) {
            if status.enabled == Some(true) {
                log::warn!("SIP is enabled; system-level deletions may be refused: {}", status.raw);
            }
        }
        let commands: Vec<Vec<String>> = targets
            .iter()
            .map(|path| {
                vec!["rm".to_string(), "-rf".to_string(), path.to_string_lossy().into_owned()]
            })
            .collect();
        let spec = CommandSpec::sudo_batch(&commands, SUDO_BATCH_TIMEOUT);
        let label = format!("remove runtime backing stores ({} targets)", targets.len());
        steps.push(StepResult::completed(label, self.runner.run(spec)));
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
