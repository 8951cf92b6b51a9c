//! Xcode developer-tools detection.
//!
//! simctl is the only way to permanently unregister simulator runtimes;
//! without it the tool can merely unmount images and clear user-space
//! directories. The common breakage is `xcode-select` pointing at
//! CommandLineTools instead of Xcode.app, which makes `xcrun` unable to
//! find simctl. When full Xcode exists anyway, a `DEVELOPER_DIR` override
//! recovers simctl without touching the machine's xcode-select state.

use std::path::Path;
use std::time::Duration;

use crate::parse::sip::{self, SipStatus};
use crate::runner::{CommandRunner, CommandSpec};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_XCODE_DEVELOPER_DIR: &str = "/Applications/Xcode.app/Contents/Developer";
pub const FIX_COMMAND: &str =
    "sudo xcode-select --switch /Applications/Xcode.app/Contents/Developer";

/// Outcome of the detection phase. The detector only reports; the decision
/// to fall back to manual mode needs a confirmation from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevToolsStatus {
    pub simctl_available: bool,
    /// True when the primary tool is unusable and manual fallback was
    /// permitted; manual mode is restricted to user-space paths.
    pub manual_only: bool,
    /// Environment override to apply to every simctl invocation.
    pub simctl_env: Vec<(String, String)>,
    pub detail: String,
}

pub fn xcode_select_path<R: CommandRunner>(runner: &R) -> Option<String> {
    let result =
        runner.run(CommandSpec::new("xcode-select", &["-p"]).with_timeout(PROBE_TIMEOUT));
    if !result.success() {
        return None;
    }
    let path = result.stdout.trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

pub fn simctl_available<R: CommandRunner>(runner: &R, env: &[(String, String)]) -> bool {
    runner
        .run(
            CommandSpec::new("xcrun", &["simctl", "list"])
                .with_timeout(PROBE_TIMEOUT)
                .with_env(env),
        )
        .success()
}

/// Compute the `DEVELOPER_DIR` override for simctl, if one is needed and a
/// usable Xcode install exists.
pub fn simctl_env<R: CommandRunner>(runner: &R) -> Vec<(String, String)> {
    if let Ok(dir) = std::env::var("DEVELOPER_DIR") {
        if Path::new(&dir).is_dir() {
            return vec![("DEVELOPER_DIR".to_string(), dir)];
        }
    }
    if let Some(path) = xcode_select_path(runner) {
        if path.contains("Xcode.app") {
            return Vec::new();
        }
    }
    if Path::new(DEFAULT_XCODE_DEVELOPER_DIR).is_dir() {
        return vec![(
            "DEVELOPER_DIR".to_string(),
            DEFAULT_XCODE_DEVELOPER_DIR.to_string(),
        )];
    }
    Vec::new()
}

/// Probe System Integrity Protection. `None` when csrutil is missing or its
/// output is unreadable; SIP state only informs a warning, never a branch.
pub fn sip_status<R: CommandRunner>(runner: &R) -> Option<SipStatus> {
    let result = runner.run(CommandSpec::new("csrutil", &["status"]).with_timeout(PROBE_TIMEOUT));
    if !result.success() {
        return None;
    }
    sip::parse_sip_status(&result.stdout).ok()
}

/// Probe the developer-tools state and decide which cleanup path is open.
pub fn check<R: CommandRunner>(runner: &R, allow_manual_fallback: bool) -> DevToolsStatus {
    let select_path = xcode_select_path(runner);
    let env = simctl_env(runner);

    let (simctl_ok, detail) = match &select_path {
        None => (
            false,
            format!("Xcode Command Line Tools not found. Install Xcode, then run: {FIX_COMMAND}"),
        ),
        Some(path) if path.contains("CommandLineTools") => {
            if !env.is_empty() && simctl_available(runner, &env) {
                (
                    true,
                    format!(
                        "xcode-select points to CommandLineTools ({path}); using DEVELOPER_DIR override for simctl"
                    ),
                )
            } else {
                (
                    false,
                    format!(
                        "xcode-select points to CommandLineTools ({path}); simulator management requires full Xcode. Fix with: {FIX_COMMAND}"
                    ),
                )
            }
        }
        Some(path) => {
            if simctl_available(runner, &env) {
                (true, "developer tools configured correctly".to_string())
            } else {
                (
                    false,
                    format!("xcrun simctl not working (xcode-select: {path}). Try: {FIX_COMMAND}"),
                )
            }
        }
    };

    DevToolsStatus {
        simctl_available: simctl_ok,
        manual_only: !simctl_ok && allow_manual_fallback,
        simctl_env: env,
        detail,
    }
}
