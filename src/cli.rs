use crate::cleanup::{FreeSpaceOptions, Orchestrator};
use crate::reporter;
use crate::runner::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    ShowHelp,
    Scan,
    Eject {
        disks: Vec<String>,
    },
    FreeSpace {
        options: FreeSpaceOptions,
        assume_yes: bool,
    },
    Nuclear {
        assume_yes: bool,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParsedArgsError {
    UnknownArgument(String),
    MissingValue(String),
    MissingCommand,
    ConflictingCommands,
}

#[derive(Debug)]
pub struct CliUsage;

impl std::fmt::Display for ParsedArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsedArgsError::UnknownArgument(arg) => {
                write!(f, "Unknown argument: {arg}")
            }
            ParsedArgsError::MissingValue(flag) => {
                write!(f, "Missing value for {flag}")
            }
            ParsedArgsError::MissingCommand => {
                write!(f, "No command given (try --scan)")
            }
            ParsedArgsError::ConflictingCommands => {
                write!(f, "Only one of --scan, --eject, --free-space, --nuclear may be given")
            }
        }
    }
}

impl std::fmt::Display for CliUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", CliUsage::text())
    }
}

impl CliUsage {
    pub fn text() -> &'static str {
        "Usage:
  simsweep <command> [options]

Commands:
  --scan               List simulator disks, runtimes, and processes. Read-only.
  --eject <disk>       Unmount the given disk (repeatable). Slice ids accepted.
  --free-space         Delete unavailable devices and simulator runtimes.
  --nuclear            Everything --free-space does, plus device data,
                       profiles, caches, and the CoreSimulator service.

Options:
  --system             With --free-space: also remove system-level runtime
                       backing stores (one admin authorization dialog).
  --no-manual-fallback With --free-space: fail instead of offering the
                       user-space fallback when simctl is unusable.
  --keep-processes     Do not stop simulator processes first.
  -y, --yes            Assume yes for confirmation prompts.
  -h, --help           Show this help."
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Scan,
    Eject,
    FreeSpace,
    Nuclear,
}

fn set_command(command: &mut Option<Command>, next: Command) -> Result<(), ParsedArgsError> {
    if command.is_some() && *command != Some(next) {
        return Err(ParsedArgsError::ConflictingCommands);
    }
    *command = Some(next);
    Ok(())
}

pub fn parse_args(args: &[String]) -> Result<ParsedArgs, ParsedArgsError> {
    let mut command: Option<Command> = None;
    let mut disks = Vec::new();
    let mut options = FreeSpaceOptions::default();
    let mut assume_yes = false;

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--scan" => {
                set_command(&mut command, Command::Scan)?;
                index += 1;
            }
            "--eject" => {
                set_command(&mut command, Command::Eject)?;
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| ParsedArgsError::MissingValue(args[index].clone()))?;
                disks.push(value.clone());
                index += 2;
            }
            "--free-space" => {
                set_command(&mut command, Command::FreeSpace)?;
                index += 1;
            }
            "--nuclear" => {
                set_command(&mut command, Command::Nuclear)?;
                index += 1;
            }
            "--system" => {
                options.system_level_authorized = true;
                index += 1;
            }
            "--no-manual-fallback" => {
                options.allow_manual_fallback = false;
                index += 1;
            }
            "--keep-processes" => {
                options.stop_processes = false;
                index += 1;
            }
            "-y" | "--yes" => {
                assume_yes = true;
                index += 1;
            }
            "-h" | "--help" => {
                return Ok(ParsedArgs::ShowHelp);
            }
            unknown => {
                return Err(ParsedArgsError::UnknownArgument(unknown.to_string()));
            }
        }
    }

    match command {
        None => Err(ParsedArgsError::MissingCommand),
        Some(Command::Scan) => Ok(ParsedArgs::Scan),
        Some(Command::Eject) => Ok(ParsedArgs::Eject { disks }),
        Some(Command::FreeSpace) => Ok(ParsedArgs::FreeSpace { options, assume_yes }),
        Some(Command::Nuclear) => Ok(ParsedArgs::Nuclear { assume_yes }),
    }
}

/// Dispatch one parsed invocation against the orchestrator. Returns
/// `Ok(true)` iff the operation succeeded; the caller maps that to the
/// process exit code. `confirm` backs every interactive prompt.
pub fn run_with_runner<R: CommandRunner>(
    args: &[String],
    orchestrator: &Orchestrator<R>,
    confirm: &dyn Fn(&str) -> bool,
) -> Result<bool, String> {
    match parse_args(args).map_err(|error| error.to_string())? {
        ParsedArgs::ShowHelp => {
            println!("{}", CliUsage::text());
            Ok(true)
        }
        ParsedArgs::Scan => {
            let disks = orchestrator.scan().map_err(|error| error.to_string())?;
            let runtimes = orchestrator.runtimes().ok();
            let processes = orchestrator.processes();
            reporter::print_scan(&disks, runtimes.as_deref(), &processes);
            Ok(true)
        }
        ParsedArgs::Eject { disks } => {
            let steps = orchestrator
                .eject_selected(&disks)
                .map_err(|error| error.to_string())?;
            Ok(reporter::print_steps(&steps))
        }
        ParsedArgs::FreeSpace { options, assume_yes } => {
            let report = orchestrator
                .free_runtime_space(&options, |detail| assume_yes || confirm(detail))
                .map_err(|error| error.to_string())?;
            Ok(reporter::print_report(&report))
        }
        ParsedArgs::Nuclear { assume_yes } => {
            let warning = "This deletes ALL simulator devices, runtimes, caches, and \
                           disables the CoreSimulator service.";
            if !assume_yes && !confirm(warning) {
                println!("Aborted.");
                return Ok(false);
            }
            let report = orchestrator.nuclear().map_err(|error| error.to_string())?;
            Ok(reporter::print_report(&report))
        }
    }
}
