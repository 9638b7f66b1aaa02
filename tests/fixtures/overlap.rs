//! Fixture for scenario 4 (spec.md §8): an overlapping trap is rejected
//! without disturbing the first trap.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_write(_arg: *mut c_void) {
    COUNTER.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    let mut x: i32 = 0;

    let id = qdbp::trap!(x, on_write, std::ptr::null_mut()).expect("first set_trap must succeed");
    // Tail-to-head slot allocation on a fresh table hands out the highest
    // index first.
    assert_eq!(id, qdbp::DEFAULT_CAPACITY - 1);

    // A one-byte range starting one byte into `x` overlaps the first trap.
    let overlap_addr = std::ptr::NonNull::from(&x).cast::<u8>();
    // SAFETY: `overlap_addr` points one byte into a live `i32`, which
    // stays valid for the duration of this call; `set_trap` is expected
    // to reject it before doing anything with the pointer.
    let overlap_addr = unsafe { overlap_addr.add(1) };
    // SAFETY: `x` outlives this call.
    let second = unsafe { qdbp::set_trap(overlap_addr, 2, on_write, std::ptr::null_mut()) };
    assert_eq!(second, Err(qdbp::Error::Overlap));

    x = 1;
    assert_eq!(x, 1);
    assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    std::process::exit(COUNTER.load(Ordering::SeqCst) as i32);
}
