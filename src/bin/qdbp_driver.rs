//! `qdbp-driver`: the out-of-process half of a quick data breakpoint.
//!
//! Spawns a tracee under `ptrace`, single-steps it across every faulting
//! access to a watched page, and notifies it to run the trap's callback.
//! See [`qdbp::driver`] for the state machine itself; this binary is just
//! argv parsing, logging setup, and the exit-status contract.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use qdbp::driver::{self, Outcome};

/// Run `<program>` under a quick-data-breakpoint driver.
#[derive(Parser, Debug)]
#[command(name = "qdbp-driver", version, about)]
struct Cli {
    /// Increase log verbosity (repeatable). Also controlled by `QDBP_LOG`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error diagnostics.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// The program to run under trace.
    program: OsString,

    /// Arguments forwarded to `program`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

fn init_logger(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let env = env_logger::Env::new().filter("QDBP_LOG").default_filter_or(default_level);
    env_logger::Builder::from_env(env).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(&cli);

    match run(&cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("qdbp-driver: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    log::debug!("spawning {:?} {:?}", cli.program, cli.args);
    let outcome = driver::spawn_and_trace(&cli.program, &cli.args)
        .with_context(|| format!("failed to trace {:?}", cli.program))?;
    if let Outcome::Signaled(signo) = outcome {
        println!("Target killed by {signo}");
    }
    Ok(outcome.driver_exit_code())
}
