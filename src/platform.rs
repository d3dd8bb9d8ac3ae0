//! Interface to the scheduler and CPU: threads, user-mode entry, interrupts.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::error::ProcResult;
use crate::proc::{Pid, Proc};
use crate::trapframe::TrapFrame;

/// Code run by a freshly spawned thread.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Local interrupt state returned by [`Platform::irq_save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqState(pub bool);

/// Services the process core needs from the scheduler and the CPU.
pub trait Platform: Send + Sync {
    /// Thread running on this CPU.
    fn current_thread(&self) -> Arc<Thread>;

    /// Make `thread` runnable; it starts by calling `entry`.
    fn spawn_thread(&self, thread: Arc<Thread>, entry: ThreadEntry) -> ProcResult<()>;

    /// Terminate the calling thread.
    fn thread_exit(&self) -> !;

    /// Drop to user mode with the registers in `tf`.
    fn enter_usermode(&self, tf: &TrapFrame) -> !;

    fn yield_now(&self);

    /// Disable interrupts on this CPU, returning the previous state.
    fn irq_save(&self) -> IrqState {
        arch::irq_save()
    }

    fn irq_restore(&self, state: IrqState) {
        arch::irq_restore(state)
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    use super::IrqState;
    use x86_64::instructions::interrupts;

    pub fn irq_save() -> IrqState {
        let enabled = interrupts::are_enabled();
        interrupts::disable();
        IrqState(enabled)
    }

    pub fn irq_restore(state: IrqState) {
        if state.0 {
            interrupts::enable();
        }
    }
}

// Hosted builds have no interrupts to mask; the thread owner lock is the only
// serialisation against the switch path.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    use super::IrqState;

    pub fn irq_save() -> IrqState {
        IrqState(false)
    }

    pub fn irq_restore(_state: IrqState) {}
}

/// Interrupts stay off on this CPU while the guard lives.
pub struct IrqGuard<'a> {
    platform: &'a dyn Platform,
    saved: IrqState,
}

impl<'a> IrqGuard<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        let saved = platform.irq_save();
        IrqGuard { platform, saved }
    }
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.platform.irq_restore(self.saved);
    }
}

/// Unique thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub u64);

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

/// A kernel thread as seen by the process core.
///
/// The owner back-reference is what the context-switch path reads to decide
/// which address space to activate, so it is only changed through
/// [`crate::ProcManager::bind_thread`] / `unbind_thread`, under its own lock
/// and with interrupts off.
pub struct Thread {
    tid: Tid,
    name: String,
    owner: Mutex<Option<Arc<Proc>>>,
}

impl Thread {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Thread {
            tid: Tid(NEXT_TID.fetch_add(1, Ordering::Relaxed)),
            name: String::from(name),
            owner: Mutex::new(None),
        })
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process this thread is bound to.
    pub fn process(&self) -> Option<Arc<Proc>> {
        self.owner.lock().clone()
    }

    pub(crate) fn set_process(&self, proc: Option<Arc<Proc>>) -> Option<Arc<Proc>> {
        core::mem::replace(&mut *self.owner.lock(), proc)
    }

    /// Set the owner unless one is already set; returns the existing owner's
    /// PID in that case.
    pub(crate) fn try_set_process(&self, proc: Arc<Proc>) -> Result<(), Pid> {
        let mut owner = self.owner.lock();
        match owner.as_ref() {
            Some(current) => Err(current.pid()),
            None => {
                *owner = Some(proc);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid.0)
            .field("name", &self.name)
            .finish()
    }
}
