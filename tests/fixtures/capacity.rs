//! Fixture for scenario 5 (spec.md §8): the table's capacity is honored,
//! and a freed slot can be reused.

use std::ffi::c_void;

use qdbp::DEFAULT_CAPACITY;

extern "C" fn noop(_arg: *mut c_void) {}

fn main() {
    // Non-overlapping 8-byte ranges, one per table slot.
    let mut slots: [i64; DEFAULT_CAPACITY] = [0; DEFAULT_CAPACITY];
    let mut ids = Vec::with_capacity(DEFAULT_CAPACITY);

    for slot in slots.iter_mut() {
        let id = qdbp::trap!(*slot, noop, std::ptr::null_mut()).expect("table should have room");
        ids.push(id);
    }

    // One more extra object past the table's capacity.
    let extra: i64 = 0;
    let full = qdbp::trap!(extra, noop, std::ptr::null_mut());
    assert_eq!(full, Err(qdbp::Error::NoSpace));

    let freed_id = ids.pop().unwrap();
    qdbp::del_trap(freed_id).expect("del_trap of a live id must succeed");

    let reused = qdbp::trap!(extra, noop, std::ptr::null_mut()).expect("slot should be free now");
    assert_eq!(reused, freed_id, "freed slot must be reused (LIFO-biased allocation)");

    std::process::exit(0);
}
