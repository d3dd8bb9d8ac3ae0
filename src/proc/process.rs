use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

use super::status::ExitStatus;
use crate::config::KERNEL_PID;
use crate::error::ProcResult;
use crate::platform::Thread;
use crate::sync::WaitCondition;
use crate::vfs::{FileTable, VnodeRef};
use crate::vm::AddressSpace;

/// Process identifier; also the process's index in the process table.
pub type Pid = i32;

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    /// Status published, teardown in progress.
    Exiting,
    /// Resources released; PID and status kept for the parent.
    Zombie,
    /// Destroyed with nobody to report to; PID already released.
    Dead,
    /// Status collected by a waiter.
    Reaped,
}

/// Pointer-valued fields, guarded by the process lock. The lock is only held
/// to read or swap these, never while working on what they point to.
pub(crate) struct ProcInner {
    pub threads: Vec<Arc<Thread>>,
    pub addrspace: Option<Arc<dyn AddressSpace>>,
    pub cwd: Option<VnodeRef>,
    pub filetable: Option<Arc<dyn FileTable>>,
    pub parent: Option<Pid>,
    pub children: Vec<Pid>,
    pub state: ProcState,
    pub destroyed: bool,
    /// Set once this process starts tearing down; children must not become
    /// zombies waiting on it.
    pub orphaning: bool,
}

pub(crate) struct ExitInfo {
    pub exitable: bool,
    pub status: ExitStatus,
}

/// Process control block.
pub struct Proc {
    pid: Pid,
    name: String,
    pub(crate) inner: Mutex<ProcInner>,
    pub(crate) wait_lock: Mutex<ExitInfo>,
    pub(crate) wait_cv: WaitCondition,
}

impl Proc {
    pub(crate) fn new(pid: Pid, name: &str) -> ProcResult<Arc<Proc>> {
        let mut owned = String::new();
        owned.try_reserve_exact(name.len())?;
        owned.push_str(name);

        Ok(Arc::new(Proc {
            pid,
            name: owned,
            inner: Mutex::new(ProcInner {
                threads: Vec::new(),
                addrspace: None,
                cwd: None,
                filetable: None,
                parent: None,
                children: Vec::new(),
                state: ProcState::Running,
                destroyed: false,
                orphaning: false,
            }),
            wait_lock: Mutex::new(ExitInfo {
                exitable: false,
                status: ExitStatus::default(),
            }),
            wait_cv: WaitCondition::new(),
        }))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_kernel(&self) -> bool {
        self.pid == KERNEL_PID
    }

    pub fn state(&self) -> ProcState {
        self.inner.lock().state
    }

    pub fn parent(&self) -> Option<Pid> {
        self.inner.lock().parent
    }

    pub fn children(&self) -> Vec<Pid> {
        self.inner.lock().children.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads.len()
    }

    pub fn address_space(&self) -> Option<Arc<dyn AddressSpace>> {
        self.inner.lock().addrspace.clone()
    }

    pub fn file_table(&self) -> Option<Arc<dyn FileTable>> {
        self.inner.lock().filetable.clone()
    }

    /// Another counted reference to the working directory.
    pub fn cwd(&self) -> Option<VnodeRef> {
        self.inner.lock().cwd.clone()
    }

    /// Exit status, once the process has published one.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        let info = self.wait_lock.lock();
        info.exitable.then_some(info.status)
    }
}

impl fmt::Debug for Proc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Proc")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish()
    }
}
