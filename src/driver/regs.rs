//! Architecture-specific register access for instruction-retirement
//! detection.
//!
//! `libc::user_regs_struct`'s field names and layout vary per
//! architecture, so reading the program counter is abstracted behind a
//! small trait rather than hardwired to one architecture's register
//! struct. Only a getter is needed: this driver never relocates the
//! tracee's execution, so it has no reason to write registers back.

/// The host x86_64 ABI's registers, as read back by `PTRACE_GETREGS`.
pub trait CpuRegs {
    /// The instruction pointer.
    fn ip(&self) -> usize;
}

#[cfg(target_arch = "x86_64")]
impl CpuRegs for libc::user_regs_struct {
    #[inline]
    fn ip(&self) -> usize {
        self.rip.try_into().unwrap()
    }
}
