//! Process management: the process table, PCB lifecycle, thread binding and
//! the exit/wait handshake.
//!
//! Locking: the table lock, each process's guard (`Proc::inner`), each
//! process's `wait_lock` and the live-process counter are independent. When
//! two process guards are held the parent's is taken first. No guard is held
//! across a call into the VM or VFS collaborators.

pub mod process;
pub mod status;
pub mod table;
mod wait;


use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, Once};

use crate::config::{ProcConfig, KERNEL_PID, KERNEL_PROC_NAME, NAME_MAX};
use crate::error::{ProcError, ProcResult};
use crate::platform::{IrqGuard, Platform, Thread};
use crate::sync::Semaphore;
use crate::vfs::{FileTable, VnodeRef};
use crate::vm::AddressSpace;

pub use process::{Pid, Proc, ProcState};
pub use status::{ExitStatus, Termination};
pub use table::ProcTable;

/// One line of `ps`-style output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcState,
    pub parent: Option<Pid>,
}

/// Owner of every process record in the system.
pub struct ProcManager {
    platform: Arc<dyn Platform>,
    config: ProcConfig,
    table: ProcTable,
    /// Live user processes; the kernel process is not counted.
    nprocs: Mutex<usize>,
    /// Signalled each time `nprocs` drops to zero.
    no_procs: Semaphore,
    kproc: Once<Arc<Proc>>,
}

impl ProcManager {
    /// Build the process table and the kernel process (PID 0).
    pub fn bootstrap(platform: Arc<dyn Platform>, config: ProcConfig) -> ProcResult<Arc<Self>> {
        let pm = Arc::new(ProcManager {
            platform,
            table: ProcTable::new(config.max_procs),
            config,
            nprocs: Mutex::new(0),
            no_procs: Semaphore::new(0),
            kproc: Once::new(),
        });
        let kproc = pm.create(KERNEL_PROC_NAME)?;
        assert_eq!(kproc.pid(), KERNEL_PID, "kernel process did not get PID 0");
        pm.kproc.call_once(|| kproc);
        crate::log_info!("Process table initialized ({} slots).", pm.table.capacity());
        Ok(pm)
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn config(&self) -> &ProcConfig {
        &self.config
    }

    pub fn kernel_process(&self) -> &Arc<Proc> {
        self.kproc
            .get()
            .unwrap_or_else(|| panic!("process subsystem used before bootstrap"))
    }

    /// Allocate and register a fresh record.
    fn create(&self, name: &str) -> ProcResult<Arc<Proc>> {
        let proc = self.table.register(|pid| Proc::new(pid, name))?;
        if !proc.is_kernel() {
            *self.nprocs.lock() += 1;
        }
        crate::log_debug!("proc: created {} (pid {})", name, proc.pid());
        Ok(proc)
    }

    /// New process for the program loader: no address space, no file table,
    /// same working directory as the caller.
    pub fn create_user_process(&self, name: &str) -> ProcResult<Arc<Proc>> {
        let proc = self.create(name)?;
        if let Some(cur) = self.current_process() {
            let cwd = cur.cwd();
            proc.inner.lock().cwd = cwd;
        }
        Ok(proc)
    }

    /// Clone the current process's PCB: same working directory, copied file
    /// table, no address space (the caller copies that). The child is not
    /// linked to the parent yet.
    pub fn fork_current(&self) -> ProcResult<Arc<Proc>> {
        let parent = self.current_process().ok_or(ProcError::InvalidArgument)?;
        let name = child_name(parent.name(), self.config.fork_suffix)?;
        let child = self.create(&name)?;

        if let Some(table) = parent.file_table() {
            match table.copy() {
                Ok(copy) => child.inner.lock().filetable = Some(copy),
                Err(e) => {
                    crate::log_warn!("fork: file table copy failed for pid {}", parent.pid());
                    self.destroy(child);
                    return Err(e);
                }
            }
        }

        let cwd = parent.cwd();
        child.inner.lock().cwd = cwd;
        Ok(child)
    }

    /// Tear down `proc`. Its threads must already be unbound.
    ///
    /// With a live parent the record stays in the table as a zombie until the
    /// parent collects it; otherwise its PID is released here.
    pub fn destroy(&self, proc: Arc<Proc>) {
        assert!(!proc.is_kernel(), "attempt to destroy the kernel process");
        let pid = proc.pid();

        let (cwd, filetable, addrspace, children) = {
            let mut inner = proc.inner.lock();
            assert!(!inner.destroyed, "process {} destroyed twice", pid);
            assert!(
                inner.threads.is_empty(),
                "process {} destroyed with {} live thread(s)",
                pid,
                inner.threads.len()
            );
            inner.destroyed = true;
            inner.orphaning = true;
            (
                inner.cwd.take(),
                inner.filetable.take(),
                inner.addrspace.take(),
                core::mem::take(&mut inner.children),
            )
        };

        drop(cwd);
        drop(filetable);
        // No thread left to reactivate it.
        drop(addrspace);

        self.orphan_children(pid, &children);

        let keep_slot = self.detach_from_parent(&proc);
        if !keep_slot {
            self.table.unregister(pid, &proc);
        }
        crate::log_debug!(
            "proc: destroyed pid {}{}",
            pid,
            if keep_slot { " (zombie)" } else { "" }
        );

        let mut nprocs = self.nprocs.lock();
        assert!(*nprocs > 0, "live process count underflow");
        *nprocs -= 1;
        if *nprocs == 0 {
            self.no_procs.signal();
        }
    }

    /// Clear the parent link of every child of `pid`; zombies among them are
    /// released since nobody is left to collect them.
    fn orphan_children(&self, pid: Pid, children: &[Pid]) {
        for &cpid in children {
            if let Some(child) = self.table.lookup(cpid) {
                let mut inner = child.inner.lock();
                if inner.parent == Some(pid) {
                    inner.parent = None;
                }
            }
        }

        // Children that exited before us already left our `children` list.
        for zombie in self.table.snapshot() {
            let release = {
                let mut inner = zombie.inner.lock();
                if inner.parent == Some(pid) && inner.state == ProcState::Zombie {
                    inner.parent = None;
                    inner.state = ProcState::Dead;
                    true
                } else {
                    false
                }
            };
            if release {
                crate::log_debug!("proc: releasing orphaned zombie pid {}", zombie.pid());
                self.table.unregister(zombie.pid(), &zombie);
            }
        }
    }

    /// Drop `proc` from its parent's children. Returns whether its slot must
    /// be kept for the parent to collect.
    fn detach_from_parent(&self, proc: &Arc<Proc>) -> bool {
        loop {
            let Some(ppid) = proc.parent() else {
                let mut inner = proc.inner.lock();
                if inner.state != ProcState::Reaped {
                    inner.state = ProcState::Dead;
                }
                return false;
            };

            let Some(parent) = self.table.lookup(ppid) else {
                proc.inner.lock().parent = None;
                continue;
            };

            let mut pinner = parent.inner.lock();
            let mut inner = proc.inner.lock();
            if inner.parent != Some(ppid) {
                continue;
            }
            pinner.children.retain(|&c| c != proc.pid());

            if pinner.orphaning {
                inner.parent = None;
            }
            return match (inner.parent, inner.state) {
                (_, ProcState::Reaped) => false,
                (Some(_), _) => {
                    inner.state = ProcState::Zombie;
                    true
                }
                (None, _) => {
                    inner.state = ProcState::Dead;
                    false
                }
            };
        }
    }

    /// Record `child` as a child of `parent`.
    pub(crate) fn link_child(&self, parent: &Arc<Proc>, child: &Arc<Proc>) -> ProcResult<()> {
        let mut pinner = parent.inner.lock();
        let mut cinner = child.inner.lock();
        pinner.children.try_reserve(1)?;
        pinner.children.push(child.pid());
        cinner.parent = Some(parent.pid());
        Ok(())
    }

    /// Undo [`Self::link_child`] for a child that never ran.
    pub(crate) fn unlink_child(&self, parent: &Arc<Proc>, child: &Arc<Proc>) {
        let mut pinner = parent.inner.lock();
        let mut cinner = child.inner.lock();
        pinner.children.retain(|&c| c != child.pid());
        cinner.parent = None;
    }

    /// Attach `thread` to `proc`.
    pub fn bind_thread(&self, proc: &Arc<Proc>, thread: &Arc<Thread>) -> ProcResult<()> {
        // The switch path reads the owner to pick the address space.
        let _irq = IrqGuard::new(&*self.platform);
        thread
            .try_set_process(proc.clone())
            .map_err(ProcError::ThreadBound)?;

        let mut inner = proc.inner.lock();
        if let Err(e) = inner.threads.try_reserve(1) {
            drop(inner);
            thread.set_process(None);
            return Err(e.into());
        }
        inner.threads.push(thread.clone());
        Ok(())
    }

    /// Detach `thread` from its process, if it has one.
    pub fn unbind_thread(&self, thread: &Arc<Thread>) {
        let Some(proc) = thread.process() else {
            return;
        };

        let found = {
            let mut inner = proc.inner.lock();
            match inner.threads.iter().position(|t| Arc::ptr_eq(t, thread)) {
                Some(index) => {
                    inner.threads.swap_remove(index);
                    true
                }
                None => false,
            }
        };
        if !found {
            crate::log_error!("proc: thread {:?} missing from pid {}", thread.tid(), proc.pid());
            panic!(
                "thread {:?} has escaped from its process {}",
                thread.tid(),
                proc.pid()
            );
        }

        let _irq = IrqGuard::new(&*self.platform);
        thread.set_process(None);
    }

    /// Process of the calling thread.
    pub fn current_process(&self) -> Option<Arc<Proc>> {
        self.platform.current_thread().process()
    }

    pub fn current_address_space(&self) -> Option<Arc<dyn AddressSpace>> {
        self.current_process()?.address_space()
    }

    /// Install `new` as the current process's address space and hand back the
    /// old one for the caller to deactivate or destroy.
    pub fn swap_address_space(
        &self,
        new: Option<Arc<dyn AddressSpace>>,
    ) -> Option<Arc<dyn AddressSpace>> {
        let proc = self
            .current_process()
            .unwrap_or_else(|| panic!("swap_address_space with no current process"));
        let mut inner = proc.inner.lock();
        core::mem::replace(&mut inner.addrspace, new)
    }

    /// Give `proc` its open-file table. Returns the one it replaces.
    pub fn install_file_table(
        &self,
        proc: &Arc<Proc>,
        table: Arc<dyn FileTable>,
    ) -> Option<Arc<dyn FileTable>> {
        proc.inner.lock().filetable.replace(table)
    }

    /// Change `proc`'s working directory. Returns the old reference.
    pub fn set_working_directory(
        &self,
        proc: &Arc<Proc>,
        cwd: Option<VnodeRef>,
    ) -> Option<VnodeRef> {
        core::mem::replace(&mut proc.inner.lock().cwd, cwd)
    }

    pub fn find_process(&self, pid: Pid) -> Option<Arc<Proc>> {
        self.table.lookup(pid)
    }

    /// Live user processes.
    pub fn process_count(&self) -> usize {
        *self.nprocs.lock()
    }

    /// Block until the live-process count next drops to zero.
    pub fn wait_for_no_processes(&self) {
        self.no_procs.wait(&*self.platform);
    }

    pub fn list_processes(&self) -> Vec<ProcInfo> {
        self.table
            .snapshot()
            .iter()
            .map(|p| {
                let inner = p.inner.lock();
                ProcInfo {
                    pid: p.pid(),
                    name: String::from(p.name()),
                    state: inner.state,
                    parent: inner.parent,
                }
            })
            .collect()
    }
}

/// `<parent>_c`, cut to `NAME_MAX` bytes on a character boundary.
fn child_name(parent: &str, suffix: &str) -> ProcResult<String> {
    let mut keep = parent.len().min(NAME_MAX.saturating_sub(suffix.len()));
    while !parent.is_char_boundary(keep) {
        keep -= 1;
    }
    let mut name = String::new();
    name.try_reserve_exact(keep + suffix.len())?;
    name.push_str(&parent[..keep]);
    name.push_str(suffix);
    Ok(name)
}
