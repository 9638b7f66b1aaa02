//! The driver: the parent process that single-steps a tracee across each
//! faulting instruction and arms the notify signal that runs its
//! callback.
//!
//! Five states (`start_up`, `wait_segv`, `single_step`, `signal_trap`,
//! `wait_trap`) drive a plain `PTRACE_TRACEME` child with a PC-delta
//! retirement check, built on `nix`'s `ptrace`/`wait`/`signal` wrappers.
//! The tracee's own fault/notify handlers (see [`crate::handlers`]) do all
//! the in-process work; the driver only forwards signals and watches the
//! program counter.

mod error;
mod regs;

pub use error::{DriverError, Result};
use regs::CpuRegs;

use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

/// The fault signal the tracee's page protections raise.
const FAULT_SIGNAL: Signal = Signal::SIGSEGV;
/// The signal the driver sends to kick off callback execution.
const NOTIFY_SIGNAL: Signal = Signal::SIGUSR1;

/// How the tracee ended, reported by [`spawn_and_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The tracee called `exit`/returned from `main` with this code.
    Exited(i32),
    /// The tracee was killed by this signal.
    Signaled(i32),
}

impl Outcome {
    /// The process exit code `qdbp-driver` itself should use: the
    /// tracee's own exit code on normal exit, `1` on death by signal.
    pub fn driver_exit_code(self) -> i32 {
        match self {
            Outcome::Exited(code) => code,
            Outcome::Signaled(_) => 1,
        }
    }
}

/// The five states of the driver's event loop.
#[derive(Debug, Clone, Copy)]
enum State {
    StartUp,
    WaitSegv,
    SingleStep { inst: usize },
    SignalTrap,
    WaitTrap,
}

/// Spawns `program` with `args` under trace and drives it to completion,
/// servicing every qdbp fault along the way.
pub fn spawn_and_trace(program: &OsStr, args: &[std::ffi::OsString]) -> Result<Outcome> {
    // SAFETY: `fork` requires that other threads either don't exist or
    // only do async-signal-safe work after the fork; `qdbp-driver` is a
    // single-threaded CLI.
    match unsafe { unistd::fork() }.map_err(DriverError::Spawn)? {
        ForkResult::Child => {
            // Never returns on success; `execvp` replaces this process
            // image. If it returns, something went wrong.
            exec_traced(program, args);
        }
        ForkResult::Parent { child } => run_state_machine(child),
    }
}

/// Runs in the forked child: requests tracing, then execs `program`.
fn exec_traced(program: &OsStr, args: &[std::ffi::OsString]) -> ! {
    if let Err(e) = ptrace::traceme() {
        // Async-signal-safety doesn't matter post-fork-pre-exec the way it
        // does in a signal handler, but we still avoid doing anything
        // fancy before either succeeding or bailing out.
        eprintln!("qdbp-driver: ptrace(PTRACE_TRACEME) failed: {e}");
        std::process::exit(1);
    }
    let program_c = CString::new(program.as_bytes()).expect("program path contains a NUL byte");
    let arg_cstrings: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_bytes()).expect("argument contains a NUL byte"))
        .collect();
    let mut argv = Vec::with_capacity(arg_cstrings.len() + 1);
    argv.push(program_c.as_c_str());
    argv.extend(arg_cstrings.iter().map(|c| c.as_c_str()));

    match unistd::execvp(&program_c, &argv) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("qdbp-driver: exec of {program:?} failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Runs in the driver (parent): the five-state loop described above.
fn run_state_machine(child: Pid) -> Result<Outcome> {
    let mut state = State::StartUp;
    loop {
        let status = wait::waitpid(child, None).map_err(DriverError::Wait)?;
        log::trace!("driver state {state:?}, wait status {status:?}");
        match status {
            WaitStatus::Exited(_, code) => return Ok(Outcome::Exited(code)),
            WaitStatus::Signaled(_, sig, _) => return Ok(Outcome::Signaled(sig as i32)),
            WaitStatus::Stopped(pid, sig) => {
                state = advance(state, pid, sig)?;
            }
            // PtraceEvent / PtraceSyscall / StillAlive / Continued are not
            // produced by the plain PTRACE_TRACEME relationship this
            // driver establishes; if one shows up anyway, just keep
            // waiting rather than treating it as fatal.
            other => {
                log::debug!("ignoring unexpected wait status {other:?}");
            }
        }
    }
}

/// One transition of the driver's state machine.
fn advance(state: State, pid: Pid, sig: Signal) -> Result<State> {
    match state {
        State::StartUp => {
            // The initial trace-stop at exec.
            expect_sigtrap(pid, sig)?;
            cont(pid, None)?;
            Ok(State::WaitSegv)
        }
        State::WaitSegv => {
            if sig != FAULT_SIGNAL {
                cont(pid, Some(sig))?;
                return Ok(State::WaitSegv);
            }
            let regs = getregs(pid)?;
            let inst = regs.ip();
            // Re-deliver the fault signal during this step so the
            // tracee's own fault handler runs as part of it.
            step(pid, Some(FAULT_SIGNAL))?;
            Ok(State::SingleStep { inst })
        }
        State::SingleStep { inst } => {
            expect_sigtrap(pid, sig)?;
            let regs = getregs(pid)?;
            let pc = regs.ip();
            // Keep stepping with no injected signal; the comparison uses
            // the PC sampled *before* this step, not after it. The PC
            // carries this value exactly once: the moment the fault
            // handler has returned and the faulting instruction is about
            // to be retried. This step call is therefore the one that
            // actually performs the watched write.
            step(pid, None)?;
            if pc == inst { Ok(State::SignalTrap) } else { Ok(State::SingleStep { inst }) }
        }
        State::SignalTrap => {
            expect_sigtrap(pid, sig)?;
            nix::sys::signal::kill(pid, NOTIFY_SIGNAL).map_err(|source| DriverError::Ptrace {
                pid,
                source,
            })?;
            cont(pid, None)?;
            Ok(State::WaitTrap)
        }
        State::WaitTrap => {
            cont(pid, Some(sig))?;
            if sig == NOTIFY_SIGNAL { Ok(State::WaitSegv) } else { Ok(State::WaitTrap) }
        }
    }
}

fn expect_sigtrap(pid: Pid, sig: Signal) -> Result<()> {
    if sig != Signal::SIGTRAP {
        return Err(DriverError::UnexpectedState {
            pid,
            detail: format!("expected SIGTRAP, got {sig}"),
        });
    }
    Ok(())
}

fn cont(pid: Pid, sig: Option<Signal>) -> Result<()> {
    ptrace::cont(pid, sig).map_err(|source| DriverError::Ptrace { pid, source })
}

fn step(pid: Pid, sig: Option<Signal>) -> Result<()> {
    ptrace::step(pid, sig).map_err(|source| DriverError::Ptrace { pid, source })
}

#[cfg(target_arch = "x86_64")]
fn getregs(pid: Pid) -> Result<libc::user_regs_struct> {
    ptrace::getregs(pid).map_err(|source| DriverError::Ptrace { pid, source })
}
