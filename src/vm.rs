//! Interface to the virtual memory system.

use alloc::sync::Arc;

use crate::error::ProcResult;

/// A user virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPtr(pub usize);

impl UserPtr {
    pub const NULL: UserPtr = UserPtr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

/// A process's user memory image.
///
/// A process holds the only long-lived handle; the address space is destroyed
/// when the last handle is dropped.
pub trait AddressSpace: Send + Sync {
    /// Deep copy for a forked child.
    fn copy(&self) -> ProcResult<Arc<dyn AddressSpace>>;

    /// Load into the MMU of this CPU.
    fn activate(&self);

    /// Make sure the MMU no longer refers to this address space.
    fn deactivate(&self);

    /// Copy `bytes` to user address `dst`. Unmapped or read-only targets fail
    /// with `BadAddress`.
    fn copy_out(&self, dst: UserPtr, bytes: &[u8]) -> ProcResult<()>;

    /// Copy from user address `src` into `buf`.
    fn copy_in(&self, src: UserPtr, buf: &mut [u8]) -> ProcResult<()>;
}
