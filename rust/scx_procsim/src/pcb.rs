//! Process control blocks and the append-only arena that owns them.

use std::fmt;

use crate::types::{PcbId, Pid, Ticks, WorkloadId};
use crate::workload::Workload;

/// Lifecycle state of a simulated process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Running,
    /// Reserved for I/O modeling; no transition enters it today.
    Blocked,
    Finished,
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcState::Ready => "ready",
            ProcState::Running => "running",
            ProcState::Blocked => "blocked",
            ProcState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Scheduler-side bookkeeping for one workload instance.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub id: WorkloadId,
    pub arrival: Ticks,
    pub runtime: Ticks,
    pub priority: i32,
    /// Ticks still owed. Only decreases while Running.
    pub remaining: Ticks,
    /// Ticks spent Ready.
    pub waiting: Ticks,
    /// Ticks spent Running.
    pub executed: Ticks,
    pub start: Option<Ticks>,
    pub finish: Option<Ticks>,
    pub last_stop: Option<Ticks>,
    pub state: ProcState,
    /// Worker process, once spawned.
    pub pid: Option<Pid>,
}

impl Pcb {
    pub fn new(workload: &Workload) -> Self {
        Self {
            id: workload.id,
            arrival: workload.arrival,
            runtime: workload.runtime,
            priority: workload.priority,
            remaining: workload.runtime,
            waiting: 0,
            executed: 0,
            start: None,
            finish: None,
            last_stop: None,
            state: ProcState::Ready,
            pid: None,
        }
    }

    /// Whether a worker has ever been spawned for this PCB.
    pub fn started(&self) -> bool {
        self.pid.is_some()
    }

    pub fn turnaround(&self) -> Option<Ticks> {
        self.finish.map(|finish| finish.saturating_sub(self.arrival))
    }

    /// Turnaround divided by requested runtime.
    pub fn weighted_turnaround(&self) -> Option<f64> {
        self.turnaround()
            .map(|ta| ta as f64 / self.runtime.max(1) as f64)
    }
}

/// Owns every PCB created during a run. Slots are never reused or moved,
/// so a `PcbId` stays valid for the whole run.
#[derive(Debug, Default)]
pub struct PcbArena {
    slots: Vec<Pcb>,
}

impl PcbArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pcb: Pcb) -> PcbId {
        let id = PcbId(self.slots.len());
        self.slots.push(pcb);
        id
    }

    pub fn get(&self, id: PcbId) -> &Pcb {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: PcbId) -> &mut Pcb {
        &mut self.slots[id.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PcbId, &Pcb)> {
        self.slots.iter().enumerate().map(|(i, pcb)| (PcbId(i), pcb))
    }

    pub fn count_in(&self, state: ProcState) -> usize {
        self.slots.iter().filter(|pcb| pcb.state == state).count()
    }
}
