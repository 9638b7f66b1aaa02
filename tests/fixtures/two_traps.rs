//! Fixture for scenario 3 (spec.md §8): two traps sharing a page fire
//! independently, and neither fires once both are deleted.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNT_A: AtomicUsize = AtomicUsize::new(0);
static COUNT_B: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_a(_arg: *mut c_void) {
    COUNT_A.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn on_b(_arg: *mut c_void) {
    COUNT_B.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    // Two `i32`s declared back to back land on the same page; that's the
    // whole point of this fixture.
    let mut a: i32 = 0;
    let mut b: i32 = 0;

    let id_a = qdbp::trap!(a, on_a, std::ptr::null_mut()).expect("set_trap(a) failed");
    let id_b = qdbp::trap!(b, on_b, std::ptr::null_mut()).expect("set_trap(b) failed");

    a = 1;
    b = 1;
    b = 2;
    assert_eq!((a, b), (1, 2));
    assert_eq!(COUNT_A.load(Ordering::SeqCst), 1);
    assert_eq!(COUNT_B.load(Ordering::SeqCst), 2);

    qdbp::del_trap(id_a).expect("del_trap(a) failed");
    qdbp::del_trap(id_b).expect("del_trap(b) failed");

    a = 9;
    b = 9;
    assert_eq!((a, b), (9, 9));
    // No further callbacks after both traps are gone.
    assert_eq!(COUNT_A.load(Ordering::SeqCst), 1);
    assert_eq!(COUNT_B.load(Ordering::SeqCst), 2);

    let code = COUNT_A.load(Ordering::SeqCst) * 16 + COUNT_B.load(Ordering::SeqCst);
    std::process::exit(code as i32);
}
