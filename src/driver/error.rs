//! Driver-side error taxonomy: everything that can go wrong spawning or
//! ptrace-ing a tracee, as distinct from the library-side [`crate::Error`].

use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to spawn tracee: {0}")]
    Spawn(#[source] nix::Error),
    #[error("ptrace operation failed on pid {pid}: {source}")]
    Ptrace {
        pid: Pid,
        #[source]
        source: nix::Error,
    },
    #[error("wait() failed: {0}")]
    Wait(#[source] nix::Error),
    #[error("tracee {pid} reached an unexpected signal-stop state: {detail}")]
    UnexpectedState { pid: Pid, detail: String },
}

pub type Result<T> = std::result::Result<T, DriverError>;
