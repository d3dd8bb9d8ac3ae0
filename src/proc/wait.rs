//! Process exit and the parent's wait on it.

use alloc::sync::Arc;

use super::process::{Pid, Proc, ProcState};
use super::status::ExitStatus;
use super::ProcManager;
use crate::error::{ProcError, ProcResult};

impl ProcManager {
    /// Terminate the current process with `status` and end the calling
    /// thread. Waiters on it are woken once the status is published.
    pub fn exit(&self, status: ExitStatus) -> ! {
        let thread = self.platform.current_thread();
        let proc = thread
            .process()
            .unwrap_or_else(|| panic!("exit from {:?} with no process", thread));
        assert!(!proc.is_kernel(), "kernel process cannot exit");

        if let Some(space) = self.swap_address_space(None) {
            space.deactivate();
            drop(space);
        }
        self.unbind_thread(&thread);

        proc.inner.lock().state = ProcState::Exiting;
        {
            let mut info = proc.wait_lock.lock();
            info.status = status;
            info.exitable = true;
            proc.wait_cv.broadcast();
        }
        crate::log_debug!("proc: pid {} exited with {:?}", proc.pid(), status);

        self.destroy(proc);
        drop(thread);
        self.platform.thread_exit()
    }

    /// Block until `pid` has exited and return its status.
    ///
    /// Only the parent may wait, except that the kernel process may wait on
    /// any process other than itself. A status is handed out once.
    pub fn wait(&self, pid: Pid) -> ProcResult<ExitStatus> {
        let caller = self.current_process().ok_or(ProcError::NoSuchChild)?;
        let child = self.find_process(pid).ok_or(ProcError::NoSuchChild)?;
        if Arc::ptr_eq(&caller, &child) {
            return Err(ProcError::NoSuchChild);
        }
        if !caller.is_kernel() && child.parent() != Some(caller.pid()) {
            return Err(ProcError::NoSuchChild);
        }

        let status = {
            let mut info = child.wait_lock.lock();
            while !info.exitable {
                info = child.wait_cv.wait(info, &child.wait_lock, &*self.platform);
            }
            info.status
        };

        self.collect(&caller, &child)?;
        crate::log_debug!("proc: pid {} reaped pid {}", caller.pid(), pid);
        Ok(status)
    }

    /// Claim `child`'s status for `caller`. A zombie's slot is released
    /// here; a child still tearing down frees itself when it finishes.
    fn collect(&self, caller: &Arc<Proc>, child: &Arc<Proc>) -> ProcResult<()> {
        let release = {
            let mut inner = child.inner.lock();
            if !caller.is_kernel() && inner.parent != Some(caller.pid()) {
                return Err(ProcError::NoSuchChild);
            }
            match inner.state {
                ProcState::Reaped | ProcState::Running => return Err(ProcError::NoSuchChild),
                ProcState::Zombie => {
                    inner.state = ProcState::Reaped;
                    true
                }
                ProcState::Exiting | ProcState::Dead => {
                    inner.state = ProcState::Reaped;
                    false
                }
            }
        };
        if release {
            self.table.unregister(child.pid(), child);
        }
        Ok(())
    }
}
