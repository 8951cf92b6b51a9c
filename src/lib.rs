pub mod cleanup;
pub mod cli;
pub mod devtools;
pub mod disks;
pub mod parse;
pub mod paths;
pub mod processes;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod space;

pub use cleanup::{CleanupError, FreeSpaceOptions, Orchestrator, Phase};
pub use report::{CleanupReport, SpaceReport, StepOutcome, StepResult};
pub use runner::{CommandResult, CommandRunner, CommandSpec, SystemRunner};
