#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use simsweep::runner::{CommandResult, CommandRunner, CommandSpec};

/// Canned-response runner keyed by the rendered command line.
///
/// Responses are matched by exact command line first, then by the longest
/// registered prefix, so home-relative paths do not need spelling out.
/// Several responses for one key form a queue; the last one repeats.
/// Unmatched commands come back as exit 127, the not-found sentinel.
pub struct FakeRunner {
    calls: RefCell<Vec<CommandSpec>>,
    responses: RefCell<HashMap<String, VecDeque<CommandResult>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(HashMap::new()),
        }
    }

    pub fn respond(&self, command: &str, result: CommandResult) {
        self.responses
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn ok(stdout: &str) -> CommandResult {
        Self::response(0, stdout, "")
    }

    pub fn response(exit_code: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            spec: CommandSpec::new("fake", &[]),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            stdout_bytes: stdout.as_bytes().to_vec(),
            stderr_bytes: stderr.as_bytes().to_vec(),
            timed_out: false,
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(CommandSpec::display).collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: CommandSpec) -> CommandResult {
        self.calls.borrow_mut().push(spec.clone());
        let display = spec.display();

        let mut responses = self.responses.borrow_mut();
        let key = if responses.contains_key(&display) {
            Some(display.clone())
        } else {
            responses
                .keys()
                .filter(|key| display.starts_with(key.as_str()))
                .max_by_key(|key| key.len())
                .cloned()
        };
        let canned = key.and_then(|key| {
            let queue = responses.get_mut(&key)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });

        match canned {
            Some(mut result) => {
                result.spec = spec;
                result
            }
            None => {
                let stderr = format!("{}: command not found", spec.program);
                CommandResult {
                    spec,
                    exit_code: 127,
                    stdout: String::new(),
                    stderr: stderr.clone(),
                    stdout_bytes: Vec::new(),
                    stderr_bytes: stderr.into_bytes(),
                    timed_out: false,
                }
            }
        }
    }
}

/// `diskutil apfs list -plist` output with the given container free space.
pub fn apfs_plist(not_allocated: u64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Containers</key>
    <array>
        <dict>
            <key>ContainerReference</key><string>disk3</string>
            <key>CapacityNotAllocated</key><integer>{not_allocated}</integer>
            <key>Volumes</key>
            <array>
                <dict>
                    <key>MountPoint</key><string>/System/Volumes/Data</string>
                    <key>Roles</key><array><string>Data</string></array>
                </dict>
            </array>
        </dict>
    </array>
</dict>
</plist>"#
    )
}

/// `diskutil list -plist` output, with or without a mounted simulator
/// runtime volume on disk4.
pub fn disk_plist(with_simulator_disk: bool) -> String {
    let simulator = if with_simulator_disk {
        r#"
        <dict>
            <key>DeviceIdentifier</key><string>disk4</string>
            <key>Size</key><integer>8254390272</integer>
            <key>Partitions</key>
            <array>
                <dict>
                    <key>DeviceIdentifier</key><string>disk4s1</string>
                    <key>VolumeName</key><string>iOS 17.4 Simulator Runtime</string>
                    <key>MountPoint</key><string>/Library/Developer/CoreSimulator/Volumes/iOS_21E213</string>
                </dict>
            </array>
        </dict>"#
    } else {
        ""
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>AllDisksAndPartitions</key>
    <array>
        <dict>
            <key>DeviceIdentifier</key><string>disk1</string>
            <key>Size</key><integer>494384795648</integer>
            <key>APFSVolumes</key>
            <array>
                <dict>
                    <key>DeviceIdentifier</key><string>disk1s1</string>
                    <key>VolumeName</key><string>Macintosh HD</string>
                    <key>MountPoint</key><string>/</string>
                </dict>
            </array>
        </dict>{simulator}
    </array>
</dict>
</plist>"#
    )
}

/// `xcrun simctl runtime list -j` output in the id-keyed map shape.
pub fn runtime_json(identifiers: &[&str]) -> String {
    let entries: Vec<String> = identifiers
        .iter()
        .map(|id| {
            format!(
                r#""{id}": {{"name": "iOS 17.4", "version": "17.4", "build": "21E213", "state": "Ready", "sizeBytes": 7516192768}}"#
            )
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}

/// Register the responses for a healthy Xcode install.
pub fn respond_healthy_devtools(runner: &FakeRunner) {
    runner.respond(
        "xcode-select -p",
        FakeRunner::ok("/Applications/Xcode.app/Contents/Developer\n"),
    );
    runner.respond("xcrun simctl list", FakeRunner::ok(""));
}

/// Register the responses for a CommandLineTools-only machine.
pub fn respond_broken_devtools(runner: &FakeRunner) {
    runner.respond(
        "xcode-select -p",
        FakeRunner::ok("/Library/Developer/CommandLineTools\n"),
    );
}
