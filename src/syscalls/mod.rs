//! System call entry for the process syscalls.

mod process;

#[cfg(test)]
mod tests;

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::error::{ProcError, ProcResult};
use crate::proc::ProcManager;
use crate::trapframe::TrapFrame;
use crate::vm::UserPtr;

pub use process::{enter_forked_process, sys__exit, sys_fork, sys_getpid, sys_waitpid};

/// Syscall numbers (passed in RAX from userland).
pub const SYS_FORK: u64 = 0;
pub const SYS__EXIT: u64 = 3;
pub const SYS_WAITPID: u64 = 4;
pub const SYS_GETPID: u64 = 5;

bitflags! {
    /// `waitpid` option bits as user code passes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitOptions: u32 {
        const WNOHANG = 1;
        const WUNTRACED = 2;
    }
}

/// Central syscall dispatcher, called from the `int 0x80` handler with the
/// saved user frame. rax=number, rdi/rsi/rdx=arguments. The return value goes
/// back in rax: the result on success, `-errno` on failure.
pub fn dispatch(pm: &Arc<ProcManager>, tf: &TrapFrame) -> u64 {
    let [arg0, arg1, arg2] = tf.args();
    let result: ProcResult<u64> = match tf.syscall_number() {
        SYS_FORK => sys_fork(pm, tf).map(|pid| pid as u64),
        SYS__EXIT => sys__exit(pm, arg0 as i32),
        SYS_WAITPID => sys_waitpid(pm, arg0 as i32, UserPtr(arg1 as usize), arg2 as u32)
            .map(|(pid, _)| pid as u64),
        SYS_GETPID => Ok(sys_getpid(pm) as u64),
        number => {
            crate::log_warn!("syscall: unknown number {}", number);
            Err(ProcError::NoSuchSyscall)
        }
    };
    encode(result)
}

/// Register encoding of a syscall result.
pub fn encode(result: ProcResult<u64>) -> u64 {
    match result {
        Ok(value) => value,
        Err(e) => (-(e.errno() as i64)) as u64,
    }
}
