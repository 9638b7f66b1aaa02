//! Error type for the trap table API.
//!
//! [`Error::errno`] recovers a POSIX-style negative-errno value
//! (`-EINVAL`, `-EBUSY`, `-ENOSPC`, ...) for callers that need to bridge
//! back to a numeric return convention.

use thiserror::Error;

/// Everything that can go wrong calling into the trap table.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `addr` was null, `len` was zero, too large for a page, or would
    /// straddle a page boundary, or `cb` was null.
    #[error("invalid argument to set_trap")]
    InvalidArgument,
    /// The requested byte range overlaps an already-live trap.
    #[error("trap range overlaps an existing trap")]
    Overlap,
    /// The trap table has no free slots.
    #[error("trap table is full")]
    NoSpace,
    /// `del_trap` was called with an id that is out of range or not live.
    #[error("trap id is out of range or already freed")]
    BadId,
    /// `set_trap`/`del_trap` was called reentrantly from a running callback.
    #[error("trap table accessed reentrantly from a callback")]
    Reentrant,
}

impl Error {
    /// The conventional POSIX-like errno this error corresponds to, as a
    /// negative value.
    pub fn errno(self) -> i32 {
        match self {
            Error::InvalidArgument => -libc::EINVAL,
            Error::Overlap => -libc::EBUSY,
            Error::NoSpace => -libc::ENOSPC,
            Error::BadId => -libc::EINVAL,
            Error::Reentrant => -libc::EAGAIN,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
