//! Quick data breakpoints: software data watchpoints for a single-threaded
//! process, implemented without hardware debug registers.
//!
//! An instrumented ("tracee") program links this crate and calls
//! [`set_trap`] to watch a byte range; any write to it (and incidentally
//! any read) fires the supplied callback before the access is retried.
//! Watching only works under the `qdbp-driver` companion binary, which
//! single-steps the tracee across each faulting instruction and sends it
//! the notify signal that actually runs the callback — see the crate's
//! `driver` module for the other half of this split.
//!
//! # Single-threaded tracees only
//! The trap table, range table, and fault-handoff state are not
//! synchronized beyond what a single faulting thread requires. Calling
//! [`set_trap`]/[`del_trap`] from more than one thread, or relying on a
//! watch while more than one thread can fault, is unsupported.

mod error;
mod handlers;
mod page;
mod trap_table;

pub mod driver;

pub use error::{Error, Result};
pub use trap_table::{Callback, DEFAULT_CAPACITY, TrapTable};

/// A [`TrapTable`] sized at [`DEFAULT_CAPACITY`], matching
/// `original_source/qdbp.c`'s compile-time `QDBP_NUM_TRAPS` default.
/// Embedders that need a larger table use `TrapTable::<N>` directly
/// rather than forking the crate.
pub type DefaultTrapTable = TrapTable<DEFAULT_CAPACITY>;

use std::ffi::c_void;
use std::ptr::NonNull;

/// Registers a watch over `addr..addr+len`.
///
/// `len` must be between 1 and the host page size, and the whole range
/// must lie within a single page. On success, returns a small id unique
/// among currently live traps, which `del_trap` later takes.
///
/// The first call ever made to `set_trap` installs the fault and notify
/// signal handlers and caches the page size; that installation is
/// idempotent and the library's only process-global side effect.
///
/// # Safety
/// `addr` must be valid for reads and writes of `len` bytes for as long
/// as the trap stays live, i.e. until a matching [`del_trap`] call
/// returns.
pub unsafe fn set_trap(
    addr: NonNull<u8>,
    len: usize,
    cb: Callback,
    arg: *mut c_void,
) -> Result<usize> {
    if handlers::in_handler() {
        return Err(Error::Reentrant);
    }
    handlers::install();
    let mut table = handlers::TABLE.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: forwarded from the caller.
    unsafe { table.set_trap(addr, len, cb, arg) }
}

/// Releases the trap with the given `id`, restoring read-write access to
/// its page if no other live trap shares it.
pub fn del_trap(id: usize) -> Result<()> {
    if handlers::in_handler() {
        return Err(Error::Reentrant);
    }
    let mut table = handlers::TABLE.lock().unwrap_or_else(|e| e.into_inner());
    table.del_trap(id)
}

/// Watches all of `object`'s bytes, supplying its address and
/// `size_of_val(object)` to [`set_trap`] automatically.
///
/// # Safety
/// Same as [`set_trap`]: `object` must outlive the trap.
#[macro_export]
macro_rules! trap {
    ($object:expr, $cb:expr, $arg:expr) => {
        // SAFETY: forwarded to the caller of this macro.
        unsafe {
            $crate::set_trap(
                ::std::ptr::NonNull::from(&$object).cast::<u8>(),
                ::std::mem::size_of_val(&$object),
                $cb,
                $arg,
            )
        }
    };
}
