#![allow(dead_code)]

use std::cell::Cell;

use anyhow::bail;
use anyhow::Result;

use scx_procsim::*;

pub type TestScheduler<C = ManualClock> = Scheduler<C, LocalChannel, RecordingWorkers, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCall {
    Spawn(Pid, Ticks),
    Pause(Pid),
    Resume(Pid),
    Terminate(Pid),
}

/// Worker control that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingWorkers {
    pub calls: Vec<WorkerCall>,
    /// Number of upcoming spawns that fail.
    pub fail_spawns: usize,
    next_pid: i32,
}

impl RecordingWorkers {
    pub fn failing(fail_spawns: usize) -> Self {
        Self {
            fail_spawns,
            ..Default::default()
        }
    }

    pub fn count(&self, f: impl Fn(&WorkerCall) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }
}

impl WorkerControl for RecordingWorkers {
    fn spawn(&mut self, runtime: Ticks) -> Result<Pid> {
        if self.fail_spawns > 0 {
            self.fail_spawns -= 1;
            bail!("fork refused");
        }
        self.next_pid += 1;
        let pid = Pid(1000 + self.next_pid);
        self.calls.push(WorkerCall::Spawn(pid, runtime));
        Ok(pid)
    }

    fn pause(&mut self, pid: Pid) -> Result<()> {
        self.calls.push(WorkerCall::Pause(pid));
        Ok(())
    }

    fn resume(&mut self, pid: Pid) -> Result<()> {
        self.calls.push(WorkerCall::Resume(pid));
        Ok(())
    }

    fn terminate(&mut self, pid: Pid) -> Result<()> {
        self.calls.push(WorkerCall::Terminate(pid));
        Ok(())
    }
}

/// Clock that moves one tick forward every time it is read.
#[derive(Debug, Default)]
pub struct SteppingClock(Cell<Ticks>);

impl Clock for SteppingClock {
    fn now(&self) -> Ticks {
        let t = self.0.get();
        self.0.set(t + 1);
        t
    }
}

pub fn workload(id: u32, arrival: Ticks, runtime: Ticks, priority: i32) -> Workload {
    Workload {
        id: WorkloadId(id),
        arrival,
        runtime,
        priority,
    }
}

pub fn scheduler_with<C: Clock>(
    clock: C,
    policy: Policy,
    quantum: Option<Ticks>,
    workers: RecordingWorkers,
) -> (TestScheduler<C>, LocalChannel) {
    let config = SchedConfig::new(policy, quantum).unwrap();
    let channel = LocalChannel::new();
    let log = EventLog::new(Vec::new()).unwrap();
    let sched = Scheduler::new(config, clock, channel.clone(), workers, log);
    (sched, channel)
}

pub fn scheduler(policy: Policy, quantum: Option<Ticks>) -> (TestScheduler, LocalChannel) {
    scheduler_with(
        ManualClock::new(0),
        policy,
        quantum,
        RecordingWorkers::default(),
    )
}

/// Queue arrivals for every workload, followed by END.
pub fn submit_all(channel: &LocalChannel, workloads: &[Workload]) {
    for w in workloads {
        channel.send(&Message::Arrival(*w)).unwrap();
    }
    channel.send(&Message::End).unwrap();
}

/// Tick from 0 until the scheduler is done. Returns the last tick.
pub fn run_to_completion<C: Clock>(sched: &mut TestScheduler<C>, limit: Ticks) -> Ticks {
    run_from(sched, 0, limit)
}

pub fn run_from<C: Clock>(sched: &mut TestScheduler<C>, first: Ticks, limit: Ticks) -> Ticks {
    for now in first..=limit {
        sched.tick(now).unwrap();
        if sched.is_done() {
            return now;
        }
    }
    panic!("scheduler not done after {limit} ticks");
}

pub fn pcb_by_id<C: Clock>(sched: &TestScheduler<C>, id: u32) -> &Pcb {
    sched
        .arena()
        .iter()
        .map(|(_, pcb)| pcb)
        .find(|pcb| pcb.id == WorkloadId(id))
        .unwrap()
}

/// `(tick, kind)` of every transition of one workload.
pub fn history<C: Clock>(sched: &TestScheduler<C>, id: u32) -> Vec<(Ticks, TransitionKind)> {
    sched
        .log()
        .history(WorkloadId(id))
        .map(|t| (t.tick, t.kind))
        .collect()
}
