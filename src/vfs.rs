//! Interface to the file system: vnodes and per-process file tables.

use alloc::sync::Arc;
use core::fmt;

use crate::error::ProcResult;

/// A filesystem node with an explicit reference count.
pub trait Vnode: Send + Sync {
    fn incref(&self);
    fn decref(&self);
}

/// One counted reference to a vnode: cloning increfs, dropping decrefs.
pub struct VnodeRef(Arc<dyn Vnode>);

impl VnodeRef {
    /// Take over a reference the caller already holds (no incref).
    pub fn adopt(vnode: Arc<dyn Vnode>) -> Self {
        VnodeRef(vnode)
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.0
    }

    pub fn same_node(&self, other: &VnodeRef) -> bool {
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }
}

impl Clone for VnodeRef {
    fn clone(&self) -> Self {
        self.0.incref();
        VnodeRef(self.0.clone())
    }
}

impl Drop for VnodeRef {
    fn drop(&mut self) {
        self.0.decref();
    }
}

impl fmt::Debug for VnodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VnodeRef({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// A process's open-file set. Dropping the last handle closes it.
pub trait FileTable: Send + Sync {
    /// Copy for a forked child: same open files, independent table.
    fn copy(&self) -> ProcResult<Arc<dyn FileTable>>;
}
