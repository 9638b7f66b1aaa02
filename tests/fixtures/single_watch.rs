//! Fixture for scenario 1 (spec.md §8): a single watch fires exactly once.
//!
//! Exit code is the callback counter, used as a side channel since the
//! fixture and its driving test don't share memory.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_write(_arg: *mut c_void) {
    COUNTER.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    let mut x: i32 = 0;
    qdbp::trap!(x, on_write, std::ptr::null_mut()).expect("set_trap failed");
    x = 1;
    assert_eq!(x, 1);
    std::process::exit(COUNTER.load(Ordering::SeqCst) as i32);
}
