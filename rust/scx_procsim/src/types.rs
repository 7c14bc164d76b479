//! Newtype wrappers and type aliases for domain concepts.
//!
//! Workload ids, OS process ids and arena slots are all small integers;
//! newtypes keep them from being mixed up.

use std::fmt;

/// Simulated time in clock ticks.
pub type Ticks = u64;

/// Workload identifier, as written in the workload file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadId(pub u32);

/// OS process identifier of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

/// Stable slot of a PCB in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PcbId(pub usize);

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Pid {
    /// Pid of the calling process.
    pub fn current() -> Self {
        Pid(std::process::id() as i32)
    }
}
