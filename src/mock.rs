//! Host doubles for the scheduler, VM and VFS, used by the test suites and
//! by anything embedding the process core on a hosted target.
//!
//! Every kernel thread is a std thread; the current thread is tracked in a
//! thread-local. "User mode" runs a program closure registered with the
//! platform.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::vec::Vec;

use spin::Mutex;

use crate::error::{ProcError, ProcResult};
use crate::platform::{IrqState, Platform, Thread, ThreadEntry};
use crate::trapframe::TrapFrame;
use crate::vfs::{FileTable, Vnode, VnodeRef};
use crate::vm::{AddressSpace, UserPtr};

std::thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
}

/// What a thread runs once it enters user mode.
pub type UserProgram = Arc<dyn Fn(&TrapFrame) + Send + Sync>;

pub struct MockPlatform {
    program: Mutex<Option<UserProgram>>,
    fail_spawn: AtomicBool,
    spawned: AtomicUsize,
    irq_saves: AtomicUsize,
    irq_restores: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(MockPlatform {
            program: Mutex::new(None),
            fail_spawn: AtomicBool::new(false),
            spawned: AtomicUsize::new(0),
            irq_saves: AtomicUsize::new(0),
            irq_restores: AtomicUsize::new(0),
        })
    }

    /// Program run by every thread that enters user mode from now on.
    pub fn set_program<F>(&self, program: F)
    where
        F: Fn(&TrapFrame) + Send + Sync + 'static,
    {
        *self.program.lock() = Some(Arc::new(program));
    }

    /// Make the next `spawn_thread` fail with `OutOfMemory`.
    pub fn fail_next_spawn(&self) {
        self.fail_spawn.store(true, Ordering::SeqCst);
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn irq_saves(&self) -> usize {
        self.irq_saves.load(Ordering::SeqCst)
    }

    pub fn irq_restores(&self) -> usize {
        self.irq_restores.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    fn current_thread(&self) -> Arc<Thread> {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(|| {
                    Thread::new(std::thread::current().name().unwrap_or("host"))
                })
                .clone()
        })
    }

    fn spawn_thread(&self, thread: Arc<Thread>, entry: ThreadEntry) -> ProcResult<()> {
        if self.fail_spawn.swap(false, Ordering::SeqCst) {
            return Err(ProcError::OutOfMemory);
        }
        std::thread::Builder::new()
            .name(std::string::String::from(thread.name()))
            .spawn(move || {
                CURRENT.with(|current| *current.borrow_mut() = Some(thread));
                entry();
            })
            .map_err(|_| ProcError::OutOfMemory)?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn thread_exit(&self) -> ! {
        CURRENT.with(|current| current.borrow_mut().take());
        loop {
            std::thread::park();
        }
    }

    fn enter_usermode(&self, tf: &TrapFrame) -> ! {
        let program = self.program.lock().clone();
        if let Some(program) = program {
            program(tf);
        }
        self.thread_exit()
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn irq_save(&self) -> IrqState {
        self.irq_saves.fetch_add(1, Ordering::SeqCst);
        IrqState(true)
    }

    fn irq_restore(&self, _state: IrqState) {
        self.irq_restores.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counters shared by an address space and all its copies.
#[derive(Default)]
pub struct SpaceStats {
    pub live: AtomicIsize,
    pub copies: AtomicUsize,
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
}

impl SpaceStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Flat user memory mapped at [`MockSpace::BASE`].
pub struct MockSpace {
    mem: Mutex<Vec<u8>>,
    stats: Arc<SpaceStats>,
    fail_copy: AtomicBool,
}

impl MockSpace {
    /// Lowest mapped user address; page 0 stays unmapped.
    pub const BASE: usize = 0x1000;

    pub fn new(size: usize, stats: &Arc<SpaceStats>) -> Arc<Self> {
        Self::with_memory(std::vec![0; size], stats)
    }

    fn with_memory(mem: Vec<u8>, stats: &Arc<SpaceStats>) -> Arc<Self> {
        stats.live.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockSpace {
            mem: Mutex::new(mem),
            stats: stats.clone(),
            fail_copy: AtomicBool::new(false),
        })
    }

    pub fn fail_next_copy(&self) {
        self.fail_copy.store(true, Ordering::SeqCst);
    }

    fn range(&self, ptr: UserPtr, len: usize) -> ProcResult<core::ops::Range<usize>> {
        let size = self.mem.lock().len();
        let start = ptr.addr().checked_sub(Self::BASE).ok_or(ProcError::BadAddress)?;
        let end = start.checked_add(len).ok_or(ProcError::BadAddress)?;
        if end > size {
            return Err(ProcError::BadAddress);
        }
        Ok(start..end)
    }
}

impl AddressSpace for MockSpace {
    fn copy(&self) -> ProcResult<Arc<dyn AddressSpace>> {
        if self.fail_copy.swap(false, Ordering::SeqCst) {
            return Err(ProcError::OutOfMemory);
        }
        let mem = self.mem.lock().clone();
        self.stats.copies.fetch_add(1, Ordering::SeqCst);
        Ok(Self::with_memory(mem, &self.stats))
    }

    fn activate(&self) {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.stats.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_out(&self, dst: UserPtr, bytes: &[u8]) -> ProcResult<()> {
        let range = self.range(dst, bytes.len())?;
        self.mem.lock()[range].copy_from_slice(bytes);
        Ok(())
    }

    fn copy_in(&self, src: UserPtr, buf: &mut [u8]) -> ProcResult<()> {
        let range = self.range(src, buf.len())?;
        buf.copy_from_slice(&self.mem.lock()[range]);
        Ok(())
    }
}

impl Drop for MockSpace {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Open-file table double; counts live tables across copies.
pub struct MockFiles {
    live: Arc<AtomicIsize>,
    fail_copy: AtomicBool,
}

impl MockFiles {
    pub fn new(live: &Arc<AtomicIsize>) -> Arc<Self> {
        live.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockFiles {
            live: live.clone(),
            fail_copy: AtomicBool::new(false),
        })
    }

    pub fn fail_next_copy(&self) {
        self.fail_copy.store(true, Ordering::SeqCst);
    }
}

impl FileTable for MockFiles {
    fn copy(&self) -> ProcResult<Arc<dyn FileTable>> {
        if self.fail_copy.swap(false, Ordering::SeqCst) {
            return Err(ProcError::OutOfMemory);
        }
        Ok(MockFiles::new(&self.live))
    }
}

impl Drop for MockFiles {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Vnode that only keeps a reference count.
pub struct MockVnode {
    refs: AtomicIsize,
}

impl MockVnode {
    pub fn new() -> Arc<Self> {
        Arc::new(MockVnode {
            refs: AtomicIsize::new(0),
        })
    }

    /// A fresh counted reference.
    pub fn reference(self: &Arc<Self>) -> VnodeRef {
        self.incref();
        VnodeRef::adopt(self.clone())
    }

    pub fn refs(&self) -> isize {
        self.refs.load(Ordering::SeqCst)
    }
}

impl Vnode for MockVnode {
    fn incref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn decref(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }
}
