//! The process table: PID allocation and lookup.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::process::{Pid, Proc};
use crate::error::{ProcError, ProcResult};

/// Fixed-capacity table indexed by PID. A PID is the index of the slot its
/// record occupies, so the lowest free slot is always handed out next.
pub struct ProcTable {
    slots: Mutex<Vec<Option<Arc<Proc>>>>,
    capacity: usize,
}

impl ProcTable {
    pub fn new(capacity: usize) -> Self {
        ProcTable {
            slots: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the first free slot and store the record `build` makes for that
    /// PID. If `build` fails the slot stays free.
    pub fn register<F>(&self, build: F) -> ProcResult<Arc<Proc>>
    where
        F: FnOnce(Pid) -> ProcResult<Arc<Proc>>,
    {
        let mut slots = self.slots.lock();
        let index = match slots.iter().position(Option::is_none) {
            Some(index) => index,
            None if slots.len() < self.capacity => {
                slots.try_reserve(1)?;
                slots.push(None);
                slots.len() - 1
            }
            None => return Err(ProcError::ProcTableFull),
        };
        let proc = build(index as Pid)?;
        debug_assert_eq!(proc.pid(), index as Pid);
        slots[index] = Some(proc.clone());
        Ok(proc)
    }

    pub fn lookup(&self, pid: Pid) -> Option<Arc<Proc>> {
        let index = usize::try_from(pid).ok()?;
        self.slots.lock().get(index)?.clone()
    }

    /// Free `pid`'s slot if it still holds `proc`.
    pub fn unregister(&self, pid: Pid, proc: &Arc<Proc>) -> bool {
        let Ok(index) = usize::try_from(pid) else {
            return false;
        };
        let mut slots = self.slots.lock();
        match slots.get_mut(index) {
            Some(slot) if slot.as_ref().is_some_and(|p| Arc::ptr_eq(p, proc)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered record, in PID order.
    pub fn snapshot(&self) -> Vec<Arc<Proc>> {
        self.slots.lock().iter().flatten().cloned().collect()
    }
}
