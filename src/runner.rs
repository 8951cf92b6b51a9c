//! Command execution seam.
//!
//! Every external command the crate issues goes through the [`CommandRunner`]
//! trait so tests can substitute canned output for real process creation.
//! [`SystemRunner`] is the production implementation: it enforces the spec's
//! timeout, captures both text and raw bytes of stdout/stderr, and never
//! fails the caller — spawn errors and timeouts come back as sentinel
//! [`CommandResult`]s so call sites have a single failure channel.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

/// Exit code reported when the executable could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the process was killed after exceeding its timeout.
pub const EXIT_TIMED_OUT: i32 = 124;
/// Exit code reported when the process could not be spawned for other reasons.
pub const EXIT_SPAWN_FAILED: i32 = 126;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One external command invocation. Immutable; constructed per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub sudo: bool,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
            current_dir: None,
            timeout: DEFAULT_TIMEOUT,
            sudo: false,
            env: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, env: &[(String, String)]) -> Self {
        self.env = env.to_vec();
        self
    }

    /// Render several commands into ONE elevated `/bin/sh -c "a ; b"` spec.
    ///
    /// macOS shows one authorization dialog per elevated invocation, so
    /// system-level deletions are batched into a single prompt. Individual
    /// command failures inside the batch are ignored by `;` chaining; the
    /// caller must re-verify the resulting state instead of trusting the
    /// batch exit code.
    pub fn sudo_batch(commands: &[Vec<String>], timeout: Duration) -> Self {
        let joined = commands
            .iter()
            .map(|cmd| {
                cmd.iter()
                    .map(|part| shell_quote(part))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" ; ");
        Self {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), joined],
            current_dir: None,
            timeout,
            sudo: true,
            env: Vec::new(),
        }
    }

    /// Human-readable rendering used for step labels and logs.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(1 + self.args.len());
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Outcome of a command invocation.
///
/// Exit code 0 with `timed_out == false` is the only clean-success signal;
/// callers still validate parsed content because several of the disk tools
/// return 0 with warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub spec: CommandSpec,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_bytes: Vec<u8>,
    pub stderr_bytes: Vec<u8>,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    fn sentinel(spec: CommandSpec, exit_code: i32, stderr: String) -> Self {
        Self {
            spec,
            exit_code,
            stdout: String::new(),
            stderr: stderr.clone(),
            stdout_bytes: Vec::new(),
            stderr_bytes: stderr.into_bytes(),
            timed_out: false,
        }
    }
}

/// Abstraction over external command execution.
///
/// Tests implement this with canned responses; see `tests/common/mod.rs`.
pub trait CommandRunner {
    fn run(&self, spec: CommandSpec) -> CommandResult;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: CommandSpec) -> CommandResult {
        (**self).run(spec)
    }
}

/// Production runner backed by `std::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: CommandSpec) -> CommandResult {
        let mut command = if spec.sudo {
            elevated_command(&spec)
        } else {
            let mut command = Command::new(&spec.program);
            command.args(&spec.args);
            for (key, value) in &spec.env {
                command.env(key, value);
            }
            command
        };
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        log::debug!("run: {}", spec.display());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                log::warn!("spawn failed for {}: {error}", spec.program);
                let code = if error.kind() == std::io::ErrorKind::NotFound {
                    EXIT_NOT_FOUND
                } else {
                    EXIT_SPAWN_FAILED
                };
                return CommandResult::sentinel(spec, code, error.to_string());
            }
        };

        // Drain pipes on threads so large output cannot deadlock the child.
        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        let (exit_code, timed_out) = match child.wait_timeout(spec.timeout) {
            Ok(Some(status)) => (status.code().unwrap_or(1), false),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                (EXIT_TIMED_OUT, true)
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("wait failed for {}: {error}", spec.program);
                (EXIT_SPAWN_FAILED, false)
            }
        };

        let stdout_bytes = stdout_handle.join().unwrap_or_default();
        let stderr_bytes = stderr_handle.join().unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout_bytes).to_string();
        let mut stderr = String::from_utf8_lossy(&stderr_bytes).to_string();
        let mut stderr_bytes = stderr_bytes;
        if timed_out && stderr.trim().is_empty() {
            stderr = format!("timeout after {}s", spec.timeout.as_secs());
            stderr_bytes = stderr.clone().into_bytes();
        }

        log::debug!("exit {exit_code} (timed_out={timed_out}): {}", spec.program);

        CommandResult {
            spec,
            exit_code,
            stdout,
            stderr,
            stdout_bytes,
            stderr_bytes,
            timed_out,
        }
    }
}

/// Wrap an elevated spec in `osascript` so macOS shows its authorization
/// dialog. The command line is passed through argv, not interpolated into
/// the AppleScript source, to avoid quoting bugs. The grant is best-effort;
/// callers re-verify state rather than trusting the reported exit code.
fn elevated_command(spec: &CommandSpec) -> Command {
    let mut rendered = String::new();
    for (key, value) in &spec.env {
        rendered.push_str(&format!("{key}={} ", shell_quote(value)));
    }
    rendered.push_str(&shell_quote(&spec.program));
    for arg in &spec.args {
        rendered.push(' ');
        rendered.push_str(&shell_quote(arg));
    }
    // `/bin/sh -c <script>` specs arrive pre-rendered; unwrap them so the
    // admin shell runs the script directly.
    let script = if spec.program == "/bin/sh" && spec.args.first().map(String::as_str) == Some("-c")
    {
        spec.args.get(1).cloned().unwrap_or_default()
    } else {
        rendered
    };

    let mut command = Command::new("osascript");
    command.args([
        "-e",
        "on run argv\n  do shell script (item 1 of argv) with administrator privileges\nend run",
        &script,
    ]);
    command
}

fn drain(pipe: Option<impl std::io::Read + Send + 'static>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            use std::io::Read;
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Single-quote a string for `/bin/sh`, matching `shlex.quote` semantics.
pub fn shell_quote(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "@%+=:,./-_".contains(ch))
    {
        return part.to_string();
    }
    format!("'{}'", part.replace('\'', "'\\''"))
}
