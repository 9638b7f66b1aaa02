//! The trap table and its refcounted backing range table.
//!
//! Capacity is a const generic rather than a fixed compile-time constant,
//! with `DEFAULT_CAPACITY` keeping the common case at eight entries.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::page::{align_page, lock_page, page_size, unlock_page};

/// Default capacity of both the trap and range tables.
pub const DEFAULT_CAPACITY: usize = 8;

/// A callback invoked when a watched byte range is accessed.
pub type Callback = extern "C" fn(*mut c_void);

/// One armed watch: `addr..addr+len` lies within a single page.
#[derive(Clone, Copy)]
struct Trap {
    cb: Callback,
    arg: *mut c_void,
    addr: usize,
    /// `0` means this slot is free.
    len: usize,
    range_idx: usize,
}

// SAFETY: `Trap` is only ever touched from the single tracee thread (the
// caller of `set_trap`/`del_trap`) or from a signal handler running
// synchronously on that same thread, per the single-threaded design
// assumption documented in the crate root.
unsafe impl Send for Trap {}

/// A refcounted page-protection handle, shared by every trap landing on
/// the same page.
#[derive(Clone, Copy)]
struct Range {
    page: usize,
    /// `0` means this slot is free.
    count: usize,
}

/// Fixed-capacity trap/range tables implementing [`crate`]'s public
/// `set_trap`/`del_trap` contract.
///
/// Slots are never compacted; both tables scan from the last slot toward
/// the first when allocating or looking up, counting down from `N - 1`.
/// This gives deterministic, LIFO-biased slot reuse.
pub struct TrapTable<const N: usize = DEFAULT_CAPACITY> {
    traps: [Trap; N],
    ranges: [Range; N],
}

impl<const N: usize> Default for TrapTable<N> {
    fn default() -> Self {
        Self {
            traps: [Trap { cb: noop_cb, arg: std::ptr::null_mut(), addr: 0, len: 0, range_idx: 0 };
                N],
            ranges: [Range { page: 0, count: 0 }; N],
        }
    }
}

extern "C" fn noop_cb(_: *mut c_void) {}

impl<const N: usize> TrapTable<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new trap over `addr..addr+len`.
    ///
    /// # Safety
    /// `addr` must be valid for `len` bytes for the lifetime of the trap,
    /// and the memory must be writable prior to the page being locked
    /// (the page is immediately remapped read-only on success).
    pub unsafe fn set_trap(
        &mut self,
        addr: NonNull<u8>,
        len: usize,
        cb: Callback,
        arg: *mut c_void,
    ) -> Result<usize> {
        let addr = addr.as_ptr() as usize;
        let page_sz = page_size();
        if len == 0 || len > page_sz {
            return Err(Error::InvalidArgument);
        }
        let laddr = align_page(addr);
        if addr.checked_add(len).is_none_or(|end| align_page(end.saturating_sub(1)) != laddr) {
            // A range that crosses a page boundary, even within the
            // `len <= page_size` bound, is rejected.
            return Err(Error::InvalidArgument);
        }

        if self.overlaps(addr, len) {
            return Err(Error::Overlap);
        }

        let t = self.free_trap_slot().ok_or(Error::NoSpace)?;
        let range_idx = self.acquire_range(laddr);
        self.traps[t] = Trap { cb, arg, addr, len, range_idx };
        Ok(t)
    }

    /// Releases the trap with the given id.
    pub fn del_trap(&mut self, id: usize) -> Result<()> {
        if id >= N || self.traps[id].len == 0 {
            return Err(Error::BadId);
        }
        let range_idx = self.traps[id].range_idx;
        self.traps[id].len = 0;
        self.release_range(range_idx);
        Ok(())
    }

    /// Finds the live trap (if any) whose byte range contains `addr`,
    /// scanning tail-to-head.
    pub(crate) fn find_trap(&self, addr: usize) -> Option<usize> {
        (0..N).rev().find(|&t| {
            let trap = &self.traps[t];
            trap.len != 0 && trap.addr <= addr && addr < trap.addr + trap.len
        })
    }

    /// Finds the live range (if any) whose page is `page`.
    pub(crate) fn find_range(&self, page: usize) -> Option<usize> {
        (0..N).rev().find(|&p| self.ranges[p].count != 0 && self.ranges[p].page == page)
    }

    pub(crate) fn trap_callback(&self, id: usize) -> (Callback, *mut c_void) {
        (self.traps[id].cb, self.traps[id].arg)
    }

    pub(crate) fn range_page(&self, idx: usize) -> usize {
        self.ranges[idx].page
    }

    fn free_trap_slot(&self) -> Option<usize> {
        (0..N).rev().find(|&t| self.traps[t].len == 0)
    }

    fn free_range_slot(&self) -> Option<usize> {
        (0..N).rev().find(|&p| self.ranges[p].count == 0)
    }

    fn overlaps(&self, addr: usize, len: usize) -> bool {
        let end = addr + len;
        (0..N).rev().any(|t| {
            let trap = &self.traps[t];
            trap.len != 0 && trap.addr < end && addr < trap.addr + trap.len
        })
    }

    /// Finds or creates the range covering `page`, incrementing its
    /// refcount, locking the page on first use.
    fn acquire_range(&mut self, page: usize) -> usize {
        let idx = match self.find_range(page) {
            Some(idx) => idx,
            None => {
                let idx = self.free_range_slot().expect(
                    "range table capacity must match trap table capacity, so a free trap slot \
                     implies a free range slot",
                );
                self.ranges[idx] = Range { page, count: 0 };
                // SAFETY: `page` is the aligned base of memory that a live
                // trap is about to point into; the caller of `set_trap`
                // upholds that it remains valid and owned.
                unsafe { lock_page(NonNull::new(page as *mut u8).unwrap()) };
                idx
            }
        };
        self.ranges[idx].count += 1;
        idx
    }

    /// Decrements the refcount on `idx`, unlocking its page once no live
    /// trap references it.
    fn release_range(&mut self, idx: usize) {
        self.ranges[idx].count -= 1;
        if self.ranges[idx].count == 0 {
            let page = self.ranges[idx].page;
            // SAFETY: the page was locked by `acquire_range` and is still
            // owned memory; dropping the last trap restores it.
            unsafe { unlock_page(NonNull::new(page as *mut u8).unwrap()) };
        }
    }

    #[cfg(test)]
    pub(crate) fn live_trap_count(&self) -> usize {
        (0..N).filter(|&t| self.traps[t].len != 0).count()
    }

    #[cfg(test)]
    pub(crate) fn range_count(&self, page: usize) -> usize {
        self.find_range(page).map_or(0, |idx| self.ranges[idx].count)
    }
}
