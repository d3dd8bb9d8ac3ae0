//! Wait status encoding.
//!
//! The two low bits say how the process ended, the rest carry the exit code
//! or signal number. User code decodes the same layout.

use bit_field::BitField;
use core::fmt;

const KIND_BITS: core::ops::Range<usize> = 0..2;
const VALUE_BITS: core::ops::Range<usize> = 2..32;
const VALUE_MASK: u32 = 0x3FFF_FFFF;

const KIND_EXITED: u32 = 0;
const KIND_SIGNALED: u32 = 1;
const KIND_CORED: u32 = 2;
const KIND_STOPPED: u32 = 3;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    CoreDumped(i32),
    Stopped(i32),
}

/// Packed wait status as stored in the PCB and copied out by `waitpid`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus(u32);

impl ExitStatus {
    fn pack(kind: u32, value: i32) -> Self {
        let mut raw = 0u32;
        raw.set_bits(KIND_BITS, kind);
        raw.set_bits(VALUE_BITS, value as u32 & VALUE_MASK);
        ExitStatus(raw)
    }

    /// Normal `_exit(code)`.
    pub fn exited(code: i32) -> Self {
        Self::pack(KIND_EXITED, code)
    }

    /// Killed by a fatal trap or signal.
    pub fn signaled(sig: i32) -> Self {
        Self::pack(KIND_SIGNALED, sig)
    }

    pub fn core_dumped(sig: i32) -> Self {
        Self::pack(KIND_CORED, sig)
    }

    pub fn stopped(sig: i32) -> Self {
        Self::pack(KIND_STOPPED, sig)
    }

    pub fn from_raw(raw: i32) -> Self {
        ExitStatus(raw as u32)
    }

    pub fn raw(self) -> i32 {
        self.0 as i32
    }

    fn value(self) -> i32 {
        // Arithmetic shift keeps the sign of negative codes.
        (self.0 as i32) >> VALUE_BITS.start
    }

    pub fn termination(self) -> Termination {
        match self.0.get_bits(KIND_BITS) {
            KIND_EXITED => Termination::Exited(self.value()),
            KIND_SIGNALED => Termination::Signaled(self.value()),
            KIND_CORED => Termination::CoreDumped(self.value()),
            _ => Termination::Stopped(self.value()),
        }
    }

    pub fn is_exited(self) -> bool {
        matches!(self.termination(), Termination::Exited(_))
    }

    /// Exit code, if the process exited normally.
    pub fn exit_code(self) -> Option<i32> {
        match self.termination() {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ExitStatus({:?})", self.termination())
    }
}
