use alloc::collections::TryReserveError;
use thiserror::Error;

use crate::proc::Pid;

/// Process subsystem error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Too many processes in system")]
    ProcTableFull,

    #[error("No child processes")]
    NoSuchChild,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Bad memory reference")]
    BadAddress,

    #[error("Thread already bound to process {0}")]
    ThreadBound(Pid),

    #[error("Function not implemented")]
    NoSuchSyscall,
}

impl From<TryReserveError> for ProcError {
    fn from(_: TryReserveError) -> Self {
        ProcError::OutOfMemory
    }
}

/// Error numbers handed back to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    ENOSYS = 1,
    ENOMEM = 3,
    EFAULT = 6,
    EINVAL = 8,
    ENPROC = 12,
    ECHILD = 16,
}

impl ProcError {
    pub fn errno(self) -> Errno {
        match self {
            ProcError::OutOfMemory => Errno::ENOMEM,
            ProcError::ProcTableFull => Errno::ENPROC,
            ProcError::NoSuchChild => Errno::ECHILD,
            ProcError::InvalidArgument | ProcError::ThreadBound(_) => Errno::EINVAL,
            ProcError::BadAddress => Errno::EFAULT,
            ProcError::NoSuchSyscall => Errno::ENOSYS,
        }
    }
}

pub type ProcResult<T> = Result<T, ProcError>;
