//! Page-size discovery and the two `mprotect` wrappers every trap relies on.
//!
//! `mprotect` is reached through `nix::sys::mman` rather than raw `libc`,
//! and the page size is cached once behind an atomic instead of
//! requeried on every trap.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::mman::{self, ProtFlags};

/// Cached page size; `0` is the "not yet initialized" sentinel.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Returns the host page size, querying and caching it on first use.
///
/// # Safety
/// Calling `sysconf` is always safe; this function just isn't `#[inline]`
/// cheap on every call, hence the cache.
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    // SAFETY: querying _SC_PAGESIZE is always safe and cannot fail.
    let sz: usize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.try_into().unwrap();
    PAGE_SIZE.store(sz, Ordering::Relaxed);
    sz
}

/// Rounds `addr` down to the start of its containing page.
pub fn align_page(addr: usize) -> usize {
    let mask = page_size() - 1;
    addr & !mask
}

/// Maps the page at `page` (already page-aligned) read-only.
///
/// # Safety
/// `page` must be a page-aligned pointer into mapped memory that this
/// process owns; remapping it read-only invalidates any outstanding `&mut`
/// borrows into the page until [`unlock_page`] restores read-write access.
pub unsafe fn lock_page(page: NonNull<u8>) {
    // SAFETY: caller upholds the page-ownership and alignment invariants.
    unsafe {
        mman::mprotect(page.cast(), page_size(), ProtFlags::PROT_READ)
            .expect("mprotect(PROT_READ) failed");
    }
}

/// Restores read+write access on the page at `page`.
///
/// # Safety
/// Same preconditions as [`lock_page`].
pub unsafe fn unlock_page(page: NonNull<u8>) {
    // SAFETY: caller upholds the page-ownership and alignment invariants.
    unsafe {
        mman::mprotect(page.cast(), page_size(), ProtFlags::PROT_READ | ProtFlags::PROT_WRITE)
            .expect("mprotect(PROT_READ | PROT_WRITE) failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_page_masks_to_page_boundary() {
        let sz = page_size();
        assert!(sz.is_power_of_two());
        let base = 3 * sz;
        assert_eq!(align_page(base), base);
        assert_eq!(align_page(base + 1), base);
        assert_eq!(align_page(base + sz - 1), base);
        assert_eq!(align_page(base + sz), base + sz);
    }
}
