//! Fixture for scenario 6 (spec.md §8): an unrelated signal the tracee
//! raises against itself is forwarded untouched by the driver and still
//! reaches the tracee's own handler.

use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_sigusr2(_signo: libc::c_int) {
    COUNTER.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    // SAFETY: installing a handler for a signal this process owns, before
    // any other thread exists.
    unsafe {
        let action = libc::sigaction {
            sa_sigaction: on_sigusr2 as usize,
            sa_mask: std::mem::zeroed(),
            sa_flags: 0,
            sa_restorer: None,
        };
        libc::sigaction(libc::SIGUSR2, &action, std::ptr::null_mut());
    }

    // Also set a watch, so this fixture also exercises a fault alongside
    // the unrelated signal traffic, which is the case the driver's
    // wait_segv/wait_trap states have to stay transparent through.
    let mut x: i32 = 0;
    extern "C" fn on_write(_arg: *mut std::ffi::c_void) {}
    qdbp::trap!(x, on_write, std::ptr::null_mut()).expect("set_trap failed");

    // SAFETY: raising a signal against our own process is always sound.
    unsafe { libc::raise(libc::SIGUSR2) };
    x = 1;
    assert_eq!(x, 1);

    std::process::exit(COUNTER.load(Ordering::SeqCst) as i32);
}
