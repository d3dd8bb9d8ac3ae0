//! Saved user register state.
//!
//! Layout follows the `int 0x80` entry path: the handler pushes `rax` and the
//! general purpose registers on top of the hardware frame (`rip`, `cs`,
//! `rflags`, `rsp`, `ss`). Keep it in sync with the entry assembly.

use static_assertions::const_assert_eq;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub rax: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const_assert_eq!(core::mem::size_of::<TrapFrame>(), 20 * 8);

impl TrapFrame {
    /// Syscall number (RAX at entry).
    pub fn syscall_number(&self) -> u64 {
        self.rax
    }

    /// Syscall arguments: RDI, RSI, RDX.
    pub fn args(&self) -> [u64; 3] {
        [self.rdi, self.rsi, self.rdx]
    }

    /// Value seen by user code in RAX when the frame is restored.
    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }
}
