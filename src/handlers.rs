//! Synchronous fault handler and asynchronous notify handler.
//!
//! The process-wide handoff state is modeled as two `AtomicIsize`
//! globals, written only by the fault handler and drained only by the
//! notify handler. Both handlers run in this process, so handing the
//! value across is a plain atomic store/swap pair rather than anything
//! involving the tracing driver.

use std::ffi::c_void;
use std::sync::{LazyLock, Mutex};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::page::{align_page, lock_page, unlock_page};
use crate::trap_table::{DEFAULT_CAPACITY, TrapTable};

/// Sentinel meaning "no trap/range recorded".
const NONE: isize = -1;

/// Set by the fault handler, drained by the notify handler. Valid only
/// during the window between the two.
static FAULT_RANGE: AtomicIsize = AtomicIsize::new(NONE);
static FAULT_TRAP: AtomicIsize = AtomicIsize::new(NONE);

/// Guards against `set_trap`/`del_trap` being called reentrantly from a
/// running callback.
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// True once [`install`] has installed both handlers.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// The global trap table, guarded by a mutex purely to satisfy `Send`/
/// `Sync` bookkeeping for `std::sync::Mutex` — the crate's whole design
/// assumes a single faulting thread, so this is never actually
/// contended.
pub(crate) static TABLE: LazyLock<Mutex<TrapTable<DEFAULT_CAPACITY>>> =
    LazyLock::new(|| Mutex::new(TrapTable::new()));

/// Returns `true` while a callback registered through [`crate::set_trap`]
/// is running on this thread.
pub(crate) fn in_handler() -> bool {
    IN_HANDLER.load(Ordering::Relaxed)
}

/// Installs the fault and notify signal handlers and caches the page
/// size, idempotently. Called lazily from the first `set_trap`.
pub(crate) fn install() {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return;
    }
    // Force the page size cache and the lazily-built trap table to
    // populate now rather than on first use inside a signal handler.
    let _ = crate::page::page_size();
    let _ = TABLE.lock().unwrap_or_else(|e| e.into_inner());

    // SAFETY: `fault_handler` is async-signal-safe (see its own doc
    // comment) and we are not currently inside a signal handler.
    unsafe {
        let fault_action = SigAction::new(
            SigHandler::SigAction(fault_handler),
            SaFlags::SA_SIGINFO,
            SigSet::empty(),
        );
        signal::sigaction(Signal::SIGSEGV, &fault_action).expect("sigaction(SIGSEGV) failed");

        let notify_action =
            SigAction::new(SigHandler::Handler(notify_handler), SaFlags::empty(), SigSet::empty());
        signal::sigaction(Signal::SIGUSR1, &notify_action).expect("sigaction(SIGUSR1) failed");
    }
}

/// The synchronous fault handler.
///
/// # Async-signal-safety
/// Only touches the lock-free atomics above, the mutex-protected trap
/// table (never held across a blocking call elsewhere), and `mprotect`,
/// all of which are safe to call from a signal handler. The abort path
/// writes its diagnostic with a raw `write(2)` rather than `eprintln!`,
/// which allocates and is not async-signal-safe.
extern "C" fn fault_handler(_signo: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut c_void) {
    // SAFETY: `info` is valid for the duration of the handler, as
    // guaranteed by the kernel for a SA_SIGINFO handler.
    let fault_addr = unsafe { (*info).si_addr() } as usize;
    let page = align_page(fault_addr);

    let mut table = TABLE.lock().unwrap_or_else(|e| e.into_inner());
    let Some(range_idx) = table.find_range(page) else {
        abort_with_diagnostic(b"qdbp: segmentation fault\n");
    };
    let trap_idx = table.find_trap(fault_addr);
    FAULT_RANGE.store(range_idx as isize, Ordering::Relaxed);
    FAULT_TRAP.store(trap_idx.map_or(NONE, |t| t as isize), Ordering::Relaxed);

    let page_addr = table.range_page(range_idx);
    drop(table);
    // SAFETY: `page_addr` is the live range's page, owned by this
    // process; unlocking it lets the faulting instruction retire.
    unsafe { unlock_page(std::ptr::NonNull::new(page_addr as *mut u8).unwrap()) };
}

/// The asynchronous notify handler, run once the driver has
/// single-stepped the tracee across the faulting instruction.
extern "C" fn notify_handler(_signo: libc::c_int) {
    let range_idx = FAULT_RANGE.swap(NONE, Ordering::Relaxed);
    let trap_idx = FAULT_TRAP.swap(NONE, Ordering::Relaxed);

    if range_idx < 0 {
        abort_with_diagnostic(b"qdbp: unexpected signal\n");
    }

    let table = TABLE.lock().unwrap_or_else(|e| e.into_inner());
    let page = table.range_page(range_idx as usize);
    let callback = (trap_idx >= 0).then(|| table.trap_callback(trap_idx as usize));
    drop(table);

    // Run the callback (if the fault landed inside a trap's byte range
    // rather than merely on its page) only after the page address has
    // been read out, so the table lock is not held across the callback.
    if let Some((cb, arg)) = callback {
        IN_HANDLER.store(true, Ordering::Relaxed);
        cb(arg);
        IN_HANDLER.store(false, Ordering::Relaxed);
    }

    // SAFETY: `page` is the live range's page, owned by this process.
    unsafe { lock_page(std::ptr::NonNull::new(page as *mut u8).unwrap()) };
}

/// Writes `msg` to stderr with a raw `write(2)` and terminates the
/// process immediately. Used on abort paths that are indistinguishable
/// from a real crash and treated as one.
fn abort_with_diagnostic(msg: &[u8]) -> ! {
    // SAFETY: `write` with a valid slice pointer/length is always sound;
    // we ignore its result since there is nothing left to do with it.
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(1);
    }
}
