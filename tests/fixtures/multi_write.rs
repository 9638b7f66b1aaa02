//! Fixture for scenario 2 (spec.md §8): repeated writes fire repeatedly.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_write(_arg: *mut c_void) {
    COUNTER.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    let mut x: i32 = 0;
    qdbp::trap!(x, on_write, std::ptr::null_mut()).expect("set_trap failed");
    for i in 1..=5 {
        x = i;
    }
    assert_eq!(x, 5);
    std::process::exit(COUNTER.load(Ordering::SeqCst) as i32);
}
