//! Limits and tunables for the process subsystem.

use log::LevelFilter;

use crate::proc::Pid;

/// PID of the kernel process. Never reused, never counted as a live process.
pub const KERNEL_PID: Pid = 0;

/// Name given to the kernel process at bootstrap.
pub const KERNEL_PROC_NAME: &str = "[kernel]";

/// Longest process name, in bytes.
pub const NAME_MAX: usize = 255;

/// Default size of the process table (and so the PID space).
pub const PROC_MAX: usize = 128;

/// Appended to the parent's name to name a forked child.
pub const FORK_NAME_SUFFIX: &str = "_c";

/// Boot-time configuration of the process subsystem.
#[derive(Debug, Clone)]
pub struct ProcConfig {
    /// Number of process table slots, kernel process included.
    pub max_procs: usize,
    pub fork_suffix: &'static str,
    /// Level handed to the serial logger by [`crate::init`].
    pub log_level: LevelFilter,
}

impl Default for ProcConfig {
    fn default() -> Self {
        ProcConfig {
            max_procs: PROC_MAX,
            fork_suffix: FORK_NAME_SUFFIX,
            log_level: LevelFilter::Info,
        }
    }
}
