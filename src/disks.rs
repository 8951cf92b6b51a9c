//! Simulator disk image discovery and unmounting.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::parse::diskutil::{self, DiskRecord};
use crate::parse::ParseError;
use crate::report::StepResult;
use crate::runner::{CommandRunner, CommandSpec};

const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// List mounted simulator-related disks, one record per parent whole disk.
pub fn scan<R: CommandRunner>(runner: &R) -> Result<Vec<DiskRecord>, ParseError> {
    let result =
        runner.run(CommandSpec::new("diskutil", &["list", "-plist"]).with_timeout(LIST_TIMEOUT));
    if !result.success() {
        return Err(ParseError::Malformed {
            what: "diskutil list",
            detail: result.stderr.trim().to_string(),
        });
    }
    let records = diskutil::parse_disk_list(&result.stdout_bytes)?;
    Ok(records.into_iter().filter(|record| record.simulator_related).collect())
}

/// Unmount the given disks by parent whole-disk identifier, then re-scan and
/// verify each target actually disappeared.
///
/// `diskutil unmountDisk force` is tried first; `hdiutil detach -force` is
/// the fallback for stubborn disk images. A target still mounted after a
/// successful-looking unmount becomes a failed verification step — the
/// command's own exit code is not trusted.
pub fn unmount<R: CommandRunner>(runner: &R, targets: &[String]) -> Vec<StepResult> {
    let devices: BTreeSet<String> =
        targets.iter().map(|device| diskutil::parent_disk(device)).collect();

    let mut steps = Vec::new();
    for device in &devices {
        steps.push(unmount_device(runner, device));
    }

    // Idempotent re-verification: the listing, not the unmount exit code,
    // decides success.
    match scan(runner) {
        Ok(remaining) => {
            let still_mounted: BTreeSet<&String> = devices
                .iter()
                .filter(|device| {
                    remaining
                        .iter()
                        .any(|record| &record.device == *device && record.mount_point.is_some())
                })
                .collect();
            for device in still_mounted {
                steps.push(StepResult::verification_failure(
                    format!("verify unmount {device}"),
                    format!("{device} is still mounted after unmount"),
                ));
            }
        }
        Err(error) => {
            steps.push(StepResult::parse_failure("verify unmount re-scan", error));
        }
    }
    steps
}

fn unmount_device<R: CommandRunner>(runner: &R, device: &str) -> StepResult {
    let spec = CommandSpec::new("diskutil", &["unmountDisk", "force", device])
        .with_timeout(UNMOUNT_TIMEOUT);
    let label = spec.display();
    let step = StepResult::completed(label, runner.run(spec)).allow_not_mounted();
    if step.ok() {
        return step;
    }

    log::info!("diskutil unmount failed for {device}, falling back to hdiutil");
    let spec =
        CommandSpec::new("hdiutil", &["detach", "-force", device]).with_timeout(UNMOUNT_TIMEOUT);
    let label = spec.display();
    StepResult::completed(label, runner.run(spec)).allow_not_mounted()
}
