mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use simsweep::cleanup::{CleanupError, FreeSpaceOptions, Orchestrator, Phase};
use simsweep::report;

use common::{
    apfs_plist, disk_plist, respond_broken_devtools, respond_healthy_devtools, runtime_json,
    FakeRunner,
};

const GB: u64 = 1024 * 1024 * 1024;

fn quiet_options() -> FreeSpaceOptions {
    FreeSpaceOptions { stop_processes: false, ..FreeSpaceOptions::default() }
}

fn respond_space_delta(runner: &FakeRunner, before: u64, after: u64) {
    runner.respond("diskutil apfs list -plist", FakeRunner::ok(&apfs_plist(before)));
    runner.respond("diskutil apfs list -plist", FakeRunner::ok(&apfs_plist(after)));
}

#[test]
fn free_space_primary_path_reports_reclaimed_delta() {
    let runner = FakeRunner::new();
    respond_space_delta(&runner, 50 * GB, 80 * GB);
    respond_healthy_devtools(&runner);
    runner.respond("xcrun simctl shutdown all", FakeRunner::ok(""));
    runner.respond("xcrun simctl delete unavailable", FakeRunner::ok(""));
    runner.respond(
        "xcrun simctl runtime list -j",
        FakeRunner::ok(&runtime_json(&["5A8DA516-0DD9-4EB4-9C03-B2C6E193DF96"])),
    );
    runner.respond("xcrun simctl runtime list -j", FakeRunner::ok(&runtime_json(&[])));
    runner.respond("xcrun simctl runtime delete all", FakeRunner::ok(""));
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(true)));
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(false)));
    runner.respond(
        "diskutil unmountDisk force disk4",
        FakeRunner::ok("Unmount of all volumes on disk4 was successful"),
    );

    let orchestrator = Orchestrator::new(&runner);
    let report = orchestrator
        .free_runtime_space(&quiet_options(), |_| panic!("no fallback expected"))
        .expect("report");

    assert!(report.commands_ok, "unexpected failure: {:?}", report.error);
    assert!(!report.manual_mode);
    assert!(!report.cancelled);
    assert_eq!(report.space.space_ok(), Some(true));
    assert_eq!(report.space.reclaimed_bytes(), 30 * GB);

    let lines = runner.call_lines();
    assert!(lines.contains(&"xcrun simctl shutdown all".to_string()));
    assert!(lines.contains(&"xcrun simctl delete unavailable".to_string()));
    assert!(lines.contains(&"xcrun simctl runtime delete all".to_string()));
    assert!(lines.contains(&"diskutil unmountDisk force disk4".to_string()));
}

#[test]
fn runtime_surviving_deletion_is_a_verification_failure() {
    let runner = FakeRunner::new();
    respond_space_delta(&runner, 50 * GB, 50 * GB);
    respond_healthy_devtools(&runner);
    runner.respond("xcrun simctl shutdown all", FakeRunner::ok(""));
    runner.respond("xcrun simctl delete unavailable", FakeRunner::ok(""));
    // The registry keeps listing the runtime no matter how often delete
    // claims success.
    runner.respond("xcrun simctl runtime list -j", FakeRunner::ok(&runtime_json(&["STUCK-1"])));
    runner.respond("xcrun simctl runtime delete all", FakeRunner::ok(""));
    runner.respond("xcrun simctl runtime delete STUCK-1", FakeRunner::ok(""));
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(false)));

    let orchestrator = Orchestrator::new(&runner);
    let report = orchestrator
        .free_runtime_space(&quiet_options(), |_| panic!("no fallback expected"))
        .expect("report");

    assert!(!report.commands_ok);
    let error = report.error.expect("failure message");
    assert!(error.contains("still registered"), "unexpected message: {error}");
    assert!(error.contains("STUCK-1"));
    // Space accounting still ran after the failure.
    assert_eq!(report.space.space_ok(), Some(false));
}

#[test]
fn unmount_claiming_success_but_still_mounted_fails_the_step() {
    let runner = FakeRunner::new();
    runner.respond(
        "diskutil unmountDisk force disk4",
        FakeRunner::ok("Unmount of all volumes on disk4 was successful"),
    );
    // Re-scan still shows the volume mounted.
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(true)));

    let orchestrator = Orchestrator::new(&runner);
    // Slice id on the way in; the unmount must target the parent disk.
    let steps = orchestrator.eject_selected(&["disk4s1".to_string()]).expect("steps");

    assert!(runner.call_lines().contains(&"diskutil unmountDisk force disk4".to_string()));
    assert!(!report::commands_ok(&steps));
    let message = report::first_required_failure(&steps).expect("failure");
    assert!(message.contains("still mounted"), "unexpected message: {message}");
}

#[test]
fn declined_manual_fallback_cancels_before_any_destructive_step() {
    let runner = FakeRunner::new();
    runner.respond("diskutil apfs list -plist", FakeRunner::ok(&apfs_plist(50 * GB)));
    respond_broken_devtools(&runner);

    let prompted = Arc::new(Mutex::new(String::new()));
    let seen = Arc::clone(&prompted);

    let orchestrator = Orchestrator::new(&runner);
    let report = orchestrator
        .free_runtime_space(&FreeSpaceOptions::default(), move |detail| {
            *seen.lock().unwrap() = detail.to_string();
            false
        })
        .expect("report");

    assert!(report.cancelled);
    assert!(report.steps.is_empty());
    assert!(!report.commands_ok);
    assert!(prompted.lock().unwrap().contains("CommandLineTools"));
    // Nothing destructive ran.
    assert!(runner.calls().iter().all(|spec| spec.program != "rm" && !spec.sudo));
}

#[test]
fn unusable_tools_without_fallback_is_an_error_before_any_action() {
    let runner = FakeRunner::new();
    runner.respond("diskutil apfs list -plist", FakeRunner::ok(&apfs_plist(50 * GB)));
    respond_broken_devtools(&runner);

    let options = FreeSpaceOptions { allow_manual_fallback: false, ..quiet_options() };
    let orchestrator = Orchestrator::new(&runner);
    let error = orchestrator
        .free_runtime_space(&options, |_| panic!("no prompt expected"))
        .expect_err("error");

    assert!(matches!(error, CleanupError::ToolsUnavailable(_)));
    assert!(runner.calls().iter().all(|spec| spec.program != "rm" && !spec.sudo));
}

#[test]
fn manual_path_touches_only_user_space_and_never_elevates() {
    let runner = FakeRunner::new();
    runner.respond("diskutil apfs list -plist", FakeRunner::ok(&apfs_plist(50 * GB)));
    respond_broken_devtools(&runner);
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(false)));
    runner.respond("rm -rf", FakeRunner::ok(""));

    let orchestrator = Orchestrator::new(&runner);
    let report = orchestrator
        .free_runtime_space(&FreeSpaceOptions::default(), |_| true)
        .expect("report");

    assert!(report.manual_mode);
    assert!(!report.cancelled);

    let home = dirs::home_dir().expect("home dir");
    let calls = runner.calls();
    assert!(calls.iter().any(|spec| spec.program == "rm"));
    for spec in &calls {
        assert!(!spec.sudo, "manual mode must never elevate: {}", spec.display());
        if spec.program == "rm" {
            let target = std::path::Path::new(&spec.args[1]);
            assert!(
                target.starts_with(&home),
                "manual mode touched {}",
                target.display()
            );
        }
    }
}

#[test]
fn cancellation_at_a_step_boundary_keeps_completed_steps() {
    let runner = FakeRunner::new();
    respond_space_delta(&runner, 50 * GB, 50 * GB);
    respond_healthy_devtools(&runner);
    runner.respond("xcrun simctl shutdown all", FakeRunner::ok(""));
    runner.respond("xcrun simctl delete unavailable", FakeRunner::ok(""));

    let phases = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&phases);

    let mut orchestrator = Orchestrator::new(&runner);
    orchestrator.on_phase(move |phase| seen.lock().unwrap().push(phase));
    orchestrator.cancel_flag().store(true, Ordering::SeqCst);

    let report = orchestrator
        .free_runtime_space(&quiet_options(), |_| panic!("no fallback expected"))
        .expect("report");

    assert!(report.cancelled);
    assert_eq!(report.steps.len(), 2);
    assert!(!report.commands_ok);
    assert_eq!(phases.lock().unwrap().last(), Some(&Phase::Cancelled));
    // The runtime registry was never touched.
    assert!(!runner
        .call_lines()
        .iter()
        .any(|line| line.starts_with("xcrun simctl runtime")));
}

#[test]
fn nuclear_runs_the_full_sweep_with_one_elevated_batch_per_concern() {
    let runner = FakeRunner::new();
    respond_space_delta(&runner, 50 * GB, 80 * GB);
    respond_healthy_devtools(&runner);
    runner.respond("xcrun simctl shutdown all", FakeRunner::ok(""));
    runner.respond("xcrun simctl delete all", FakeRunner::ok(""));
    runner.respond("xcrun simctl runtime list -j", FakeRunner::ok(&runtime_json(&[])));
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(false)));
    runner.respond("rm -rf", FakeRunner::ok(""));
    runner.respond("/bin/sh -c launchctl", FakeRunner::ok(""));
    runner.respond("/bin/sh -c rm", FakeRunner::ok(""));
    runner.respond(
        "csrutil status",
        FakeRunner::ok("System Integrity Protection status: enabled.\n"),
    );

    let orchestrator = Orchestrator::new(&runner);
    let report = orchestrator.nuclear().expect("report");

    assert!(report.commands_ok, "unexpected failure: {:?}", report.error);
    assert!(!report.manual_mode);
    assert_eq!(report.space.reclaimed_bytes(), 30 * GB);

    let calls = runner.calls();
    let lines = runner.call_lines();
    assert!(lines.contains(&"xcrun simctl delete all".to_string()));
    // Exactly two elevated invocations: service disable and backing stores.
    assert_eq!(calls.iter().filter(|spec| spec.sudo).count(), 2);
    assert!(lines.iter().any(|line| line.starts_with("/bin/sh -c launchctl bootout")));
}

#[test]
fn second_operation_after_the_first_completes_is_accepted() {
    let runner = FakeRunner::new();
    runner.respond("diskutil list -plist", FakeRunner::ok(&disk_plist(false)));

    let orchestrator = Orchestrator::new(&runner);
    orchestrator.eject_selected(&[]).expect("first");
    orchestrator.eject_selected(&[]).expect("busy flag must reset");
}
