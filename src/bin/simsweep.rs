use std::env;
use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

use simsweep::cli::{run_with_runner, CliUsage};
use simsweep::cleanup::{Orchestrator, Phase};
use simsweep::runner::SystemRunner;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();

    let mut orchestrator = Orchestrator::new(SystemRunner::new());
    let cancel = orchestrator.cancel_flag();
    if let Err(error) = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
        eprintln!("\ncancelling after the current step...");
    }) {
        log::warn!("could not install signal handler: {error}");
    }
    orchestrator.on_phase(|phase| {
        if phase != Phase::Idle {
            eprintln!("... {}", phase.describe());
        }
    });

    match run_with_runner(&args, &orchestrator, &prompt_confirm) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("{error}");
            eprintln!("{}", CliUsage::text());
            std::process::exit(1);
        }
    }
}

fn prompt_confirm(prompt: &str) -> bool {
    eprintln!("{prompt}");
    eprint!("Proceed? [y/N] ");
    io::stderr().flush().ok();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes" | "YES")
}
