//! Step and report types shared by the services and the orchestrator.
//!
//! Nothing in the cleanup pipeline raises on a failed command; each action
//! becomes a [`StepResult`] and the final [`CleanupReport`] carries every
//! one of them, so no failure can be swallowed behind an optimistic
//! summary.

use crate::parse::apfs::ApfsMetrics;
use crate::parse::ParseError;
use crate::runner::CommandResult;
use crate::space::DfStats;

/// stderr/stdout substrings that mean the OS denied the operation.
const DENIED_MARKERS: &[&str] = &["operation not permitted", "permission denied"];
/// Substrings that mean an unmount target was already gone.
const NOT_MOUNTED_MARKERS: &[&str] = &["not mounted", "not currently mounted", "not a mount point"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The command ran; success is judged from the result.
    Completed(CommandResult),
    /// The command ran but its output could not be interpreted.
    Parse(ParseError),
    /// The triggering command claimed success but re-verification still
    /// found the target present.
    Verification(String),
}

/// One sequenced cleanup action and its judged outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub label: String,
    /// Optional steps may fail without flipping `commands_ok`.
    pub required: bool,
    pub sudo: bool,
    /// Unmount steps treat an already-unmounted target as success.
    pub allow_not_mounted: bool,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn completed(label: impl Into<String>, result: CommandResult) -> Self {
        Self {
            label: label.into(),
            required: true,
            sudo: result.spec.sudo,
            allow_not_mounted: false,
            outcome: StepOutcome::Completed(result),
        }
    }

    pub fn parse_failure(label: impl Into<String>, error: ParseError) -> Self {
        Self {
            label: label.into(),
            required: true,
            sudo: false,
            allow_not_mounted: false,
            outcome: StepOutcome::Parse(error),
        }
    }

    pub fn verification_failure(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            required: true,
            sudo: false,
            allow_not_mounted: false,
            outcome: StepOutcome::Verification(detail.into()),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn allow_not_mounted(mut self) -> Self {
        self.allow_not_mounted = true;
        self
    }

    pub fn ok(&self) -> bool {
        match &self.outcome {
            StepOutcome::Completed(result) => {
                if result.timed_out || self.denied() {
                    return false;
                }
                if result.success() {
                    return true;
                }
                self.allow_not_mounted && marker_match(result, NOT_MOUNTED_MARKERS)
            }
            StepOutcome::Parse(_) | StepOutcome::Verification(_) => false,
        }
    }

    /// The OS refused the operation outright. Recorded like any other
    /// failure; system-level steps get skipped while user-space ones
    /// continue.
    pub fn denied(&self) -> bool {
        match &self.outcome {
            StepOutcome::Completed(result) => marker_match(result, DENIED_MARKERS),
            _ => false,
        }
    }

    /// Operator-facing explanation of a failed step.
    pub fn failure_message(&self) -> Option<String> {
        if self.ok() {
            return None;
        }
        let message = match &self.outcome {
            StepOutcome::Completed(result) => {
                if result.timed_out {
                    format!("{}: timed out", self.label)
                } else {
                    let detail = result.stderr.trim();
                    let detail = if detail.is_empty() { result.stdout.trim() } else { detail };
                    if detail.is_empty() {
                        format!("{}: exit code {}", self.label, result.exit_code)
                    } else {
                        format!("{}: {detail}", self.label)
                    }
                }
            }
            StepOutcome::Parse(error) => format!("{}: {error}", self.label),
            StepOutcome::Verification(detail) => format!("{}: {detail}", self.label),
        };
        Some(message)
    }
}

fn marker_match(result: &CommandResult, markers: &[&str]) -> bool {
    let text = format!("{} {}", result.stderr, result.stdout).to_lowercase();
    markers.iter().any(|marker| text.contains(marker))
}

pub fn commands_ok(steps: &[StepResult]) -> bool {
    steps.iter().filter(|step| step.required).all(StepResult::ok)
}

pub fn first_required_failure(steps: &[StepResult]) -> Option<String> {
    steps
        .iter()
        .find(|step| step.required && !step.ok())
        .and_then(StepResult::failure_message)
}

/// Before/after space accounting for one cleanup operation.
///
/// `reclaimed_bytes` applies the positive-only invariant: a non-positive
/// delta is reported as zero reclaimed, never negative and never invented.
/// The optional df snapshot is display-only and never feeds the delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceReport {
    pub before: Option<ApfsMetrics>,
    pub after: Option<ApfsMetrics>,
    pub fallback_display: Option<DfStats>,
}

impl SpaceReport {
    pub fn reclaimed_bytes(&self) -> u64 {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => {
                after.not_allocated.saturating_sub(before.not_allocated)
            }
            _ => 0,
        }
    }

    /// `Some(true)` only when both captures exist and the delta is strictly
    /// positive; `None` when the metric was unavailable on either side.
    pub fn space_ok(&self) -> Option<bool> {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => Some(after.not_allocated > before.not_allocated),
            _ => None,
        }
    }
}

/// Final report for one user-facing cleanup operation.
///
/// `commands_ok` and the space figures are deliberately separate: whether
/// the steps succeeded and whether space moved are different questions, and
/// the presentation layer decides how to combine them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub commands_ok: bool,
    pub space: SpaceReport,
    pub steps: Vec<StepResult>,
    pub manual_mode: bool,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl CleanupReport {
    pub fn cancelled_with(steps: Vec<StepResult>) -> Self {
        Self {
            commands_ok: false,
            space: SpaceReport::default(),
            steps,
            manual_mode: false,
            cancelled: true,
            error: Some("cancelled".to_string()),
        }
    }
}
