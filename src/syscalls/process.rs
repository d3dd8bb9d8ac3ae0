use alloc::boxed::Box;
use alloc::sync::Arc;

use super::WaitOptions;
use crate::config::KERNEL_PID;
use crate::error::{ProcError, ProcResult};
use crate::platform::{Thread, ThreadEntry};
use crate::proc::{ExitStatus, Pid, ProcManager};
use crate::trapframe::TrapFrame;
use crate::vm::UserPtr;

pub fn sys_getpid(pm: &ProcManager) -> Pid {
    pm.current_process().map_or(KERNEL_PID, |p| p.pid())
}

/// Duplicate the calling process. Returns the child's PID to the parent;
/// the child resumes from the same trap frame with 0 in rax.
///
/// On any failure everything built for the child is torn down again and the
/// parent is left as it was.
pub fn sys_fork(pm: &Arc<ProcManager>, tf: &TrapFrame) -> ProcResult<Pid> {
    let parent = pm.current_process().ok_or(ProcError::InvalidArgument)?;
    let child = pm.fork_current()?;

    if let Some(space) = parent.address_space() {
        match space.copy() {
            Ok(copy) => child.inner.lock().addrspace = Some(copy),
            Err(e) => {
                crate::log_warn!("sys_fork: address space copy failed for pid {}", parent.pid());
                pm.destroy(child);
                return Err(e);
            }
        }
    }

    let child_tf = *tf;

    if let Err(e) = pm.link_child(&parent, &child) {
        pm.destroy(child);
        return Err(e);
    }

    let thread = Thread::new(child.name());
    if let Err(e) = pm.bind_thread(&child, &thread) {
        pm.unlink_child(&parent, &child);
        pm.destroy(child);
        return Err(e);
    }

    let child_pm = pm.clone();
    let entry: ThreadEntry = Box::new(move || {
        enter_forked_process(&child_pm, child_tf);
    });
    if let Err(e) = pm.platform().spawn_thread(thread.clone(), entry) {
        crate::log_warn!("sys_fork: could not start thread for pid {}", child.pid());
        pm.unbind_thread(&thread);
        pm.unlink_child(&parent, &child);
        pm.destroy(child);
        return Err(e);
    }

    crate::log_debug!("sys_fork: pid {} -> pid {}", parent.pid(), child.pid());
    Ok(child.pid())
}

/// First thing a forked child runs: switch to its address space and return
/// to user mode as if `fork` had returned 0.
pub fn enter_forked_process(pm: &ProcManager, mut tf: TrapFrame) -> ! {
    if let Some(space) = pm.current_address_space() {
        space.activate();
    }
    tf.set_return(0);
    pm.platform().enter_usermode(&tf)
}

/// Wait for child `pid` and store its raw status at `status` (unless null).
pub fn sys_waitpid(
    pm: &ProcManager,
    pid: Pid,
    status: UserPtr,
    options: u32,
) -> ProcResult<(Pid, ExitStatus)> {
    if options != 0 {
        let known = WaitOptions::from_bits(options);
        crate::log_debug!("sys_waitpid: unsupported options {:?}", known);
        return Err(ProcError::InvalidArgument);
    }

    let exit = pm.wait(pid)?;

    if !status.is_null() {
        let space = pm.current_address_space().ok_or(ProcError::BadAddress)?;
        space.copy_out(status, &exit.raw().to_ne_bytes())?;
    }
    Ok((pid, exit))
}

#[allow(non_snake_case)]
pub fn sys__exit(pm: &ProcManager, code: i32) -> ! {
    pm.exit(ExitStatus::exited(code))
}
