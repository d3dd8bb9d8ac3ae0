#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Process management core of AtomicOS.
//!
//! The kernel calls [`init`] once at boot with its [`Platform`] (scheduler
//! and CPU glue), then routes `int 0x80` process syscalls through
//! [`syscalls::dispatch`] with [`procs`].

extern crate alloc;

pub mod config;
pub mod error;
pub mod serial;
pub mod sync;
pub mod trapframe;
pub mod platform;
pub mod vm;
pub mod vfs;
pub mod proc;
pub mod syscalls;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[doc(hidden)]
pub use log as __log;

pub use config::ProcConfig;
pub use error::{Errno, ProcError, ProcResult};
pub use platform::{Platform, Thread};
pub use proc::{ExitStatus, Pid, Proc, ProcManager, ProcState};

use alloc::sync::Arc;
use spin::Once;

static PROCS: Once<Arc<ProcManager>> = Once::new();

/// Bring up logging and the process table. Later calls return the manager
/// built by the first one.
pub fn init(platform: Arc<dyn Platform>, config: ProcConfig) -> ProcResult<&'static Arc<ProcManager>> {
    if let Some(pm) = PROCS.get() {
        return Ok(pm);
    }
    serial::init(config.log_level);
    let pm = ProcManager::bootstrap(platform, config)?;
    crate::log_info!("Process subsystem initialized.");
    Ok(PROCS.call_once(|| pm))
}

/// The global process manager.
///
/// Panics if [`init`] has not run.
pub fn procs() -> &'static Arc<ProcManager> {
    PROCS
        .get()
        .unwrap_or_else(|| panic!("process subsystem not initialized"))
}
