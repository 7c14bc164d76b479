//! Scheduler core.
//!
//! One [`Scheduler`] owns the PCB arena, the ready queue, the metrics and
//! the event log. Everything runs on the caller's thread; workers are only
//! reached through [`WorkerControl`] and the [`Channel`].
//!
//! Each simulated tick is processed by [`Scheduler::tick`] in a fixed
//! order:
//!
//! 1. ingest pending arrivals and completion events
//! 2. charge the running process one tick, finish it if nothing remains
//! 3. round robin only: count the quantum, preempt when it is used up
//! 4. dispatch if the CPU is idle
//! 5. look for the end-of-stream marker
//! 6. add one tick of waiting time to every ready process
//!
//! A PCB dispatched at tick `t` runs during `(t, t + 1]` and is charged
//! for it at tick `t + 1`.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::info;
use log::warn;

use crate::clock::Clock;
use crate::ipc::{Channel, Message, MessageKind};
use crate::pcb::{Pcb, PcbArena, ProcState};
use crate::policy::{Policy, SchedConfig};
use crate::queue::ReadyQueue;
use crate::stats::{Metrics, Summary};
use crate::trace::{EventLog, Transition, TransitionKind};
use crate::types::{PcbId, Ticks};
use crate::worker::WorkerControl;
use crate::workload::Workload;

const DEFAULT_POLL: Duration = Duration::from_millis(10);

pub struct Scheduler<C, Q, W, O>
where
    C: Clock,
    Q: Channel,
    W: WorkerControl,
    O: Write,
{
    config: SchedConfig,
    clock: C,
    channel: Q,
    workers: W,
    log: EventLog<O>,
    poll: Duration,

    arena: PcbArena,
    ready: ReadyQueue,
    running: Option<PcbId>,
    quantum_used: Ticks,
    metrics: Metrics,

    /// Arrivals received but not yet due.
    backlog: VecDeque<Workload>,
    end_of_stream: bool,
    last_tick: Option<Ticks>,
}

impl<C, Q, W, O> Scheduler<C, Q, W, O>
where
    C: Clock,
    Q: Channel,
    W: WorkerControl,
    O: Write,
{
    pub fn new(config: SchedConfig, clock: C, channel: Q, workers: W, log: EventLog<O>) -> Self {
        Self {
            config,
            clock,
            channel,
            workers,
            log,
            poll: DEFAULT_POLL,
            arena: PcbArena::new(),
            ready: ReadyQueue::new(),
            running: None,
            quantum_used: 0,
            metrics: Metrics::new(),
            backlog: VecDeque::new(),
            end_of_stream: false,
            last_tick: None,
        }
    }

    /// Wall-clock interval between clock polls in [`Scheduler::run`].
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Process one simulated tick.
    pub fn tick(&mut self, now: Ticks) -> Result<()> {
        self.ingest_arrivals(now);
        self.ingest_completions();
        self.charge_running(now)?;
        if self.config.policy == Policy::RoundRobin {
            self.expire_quantum(now)?;
        }
        if self.running.is_none() {
            self.dispatch(now)?;
        }
        self.check_end_of_stream();
        self.accrue_waiting();

        self.last_tick = Some(now);
        Ok(())
    }

    /// Follow the clock until the workload is drained or `shutdown` is
    /// raised. Every tick since the clock value at entry is processed
    /// exactly once, even when a poll comes late.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<Summary> {
        let mut next = self.clock.now();
        info!(
            "scheduling with {} (quantum {:?}) from tick {}",
            self.config.policy, self.config.quantum, next
        );

        'outer: loop {
            let now = self.clock.now();
            while next <= now {
                self.tick(next)?;
                next += 1;
                if self.is_done() {
                    break 'outer;
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                warn!(
                    "interrupted at tick {} with {} ready, {} running",
                    now,
                    self.ready.len(),
                    self.running.is_some() as usize
                );
                break;
            }
            std::thread::sleep(self.poll);
        }

        let summary = self.summary();
        info!(
            "{} processes finished by tick {}",
            self.metrics.finished,
            self.last_tick.unwrap_or(0)
        );
        Ok(summary)
    }

    /// End of stream seen, nothing queued, nothing running.
    pub fn is_done(&self) -> bool {
        self.end_of_stream
            && self.backlog.is_empty()
            && self.ready.is_empty()
            && self.running.is_none()
    }

    /// Report for everything finished so far, with elapsed time equal to
    /// the last processed tick.
    pub fn summary(&self) -> Summary {
        self.metrics.summary(self.last_tick.unwrap_or(0))
    }

    pub fn arena(&self) -> &PcbArena {
        &self.arena
    }

    pub fn ready_queue(&self) -> &ReadyQueue {
        &self.ready
    }

    pub fn running(&self) -> Option<PcbId> {
        self.running
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn log(&self) -> &EventLog<O> {
        &self.log
    }

    pub fn workers(&self) -> &W {
        &self.workers
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn last_tick(&self) -> Option<Ticks> {
        self.last_tick
    }

    fn record(&mut self, now: Ticks, kind: TransitionKind, id: PcbId) -> Result<()> {
        let transition = Transition::new(now, kind, self.arena.get(id));
        debug!("{}", transition);
        self.log.record(transition)
    }

    fn ingest_arrivals(&mut self, now: Ticks) {
        while let Some(msg) = self.channel.try_recv(MessageKind::Arrival) {
            if let Message::Arrival(w) = msg {
                self.backlog.push_back(w);
            }
        }

        // The generator sends in arrival order; hold back anything ahead of
        // the tick being processed.
        while let Some(w) = self.backlog.front().copied() {
            if w.arrival > now {
                break;
            }
            self.backlog.pop_front();

            let mut pcb = Pcb::new(&w);
            pcb.waiting = now.saturating_sub(w.arrival);
            let id = self.arena.insert(pcb);
            self.ready.enqueue(id);
            debug!(
                "tick {}: process {} arrived (arr {} runtime {} prio {})",
                now, w.id, w.arrival, w.runtime, w.priority
            );
        }
    }

    fn ingest_completions(&mut self) {
        while let Some(msg) = self.channel.try_recv(MessageKind::Completion) {
            let Message::Completion { pid } = msg else {
                continue;
            };
            match self.running {
                Some(id) if self.arena.get(id).pid == Some(pid) => {
                    debug!("worker {} reported completion", pid);
                    self.arena.get_mut(id).remaining = 0;
                }
                _ => debug!("ignoring stale completion from worker {}", pid),
            }
        }
    }

    fn charge_running(&mut self, now: Ticks) -> Result<()> {
        let Some(id) = self.running else {
            return Ok(());
        };

        let pcb = self.arena.get_mut(id);
        pcb.remaining = pcb.remaining.saturating_sub(1);
        pcb.executed += 1;
        if pcb.remaining == 0 {
            self.finish(id, now)?;
        }
        Ok(())
    }

    fn finish(&mut self, id: PcbId, now: Ticks) -> Result<()> {
        let pcb = self.arena.get_mut(id);
        pcb.state = ProcState::Finished;
        pcb.finish = Some(now);
        let pid = pcb.pid;

        self.metrics.record_finish(self.arena.get(id));
        self.running = None;
        self.quantum_used = 0;
        self.record(now, TransitionKind::Finished, id)?;

        if let Some(pid) = pid {
            if let Err(e) = self.workers.terminate(pid) {
                warn!("{:#}", e);
            }
        }
        Ok(())
    }

    fn expire_quantum(&mut self, now: Ticks) -> Result<()> {
        let (Some(id), Some(quantum)) = (self.running, self.config.quantum) else {
            return Ok(());
        };

        self.quantum_used += 1;
        if self.quantum_used < quantum || self.arena.get(id).remaining == 0 {
            return Ok(());
        }

        let pcb = self.arena.get_mut(id);
        if let Some(pid) = pcb.pid {
            self.workers
                .pause(pid)
                .with_context(|| format!("Failed to preempt process {}", pcb.id))?;
        }
        pcb.state = ProcState::Ready;
        pcb.last_stop = Some(now);

        self.running = None;
        self.quantum_used = 0;
        self.ready.enqueue(id);
        self.record(now, TransitionKind::Stopped, id)
    }

    fn dispatch(&mut self, now: Ticks) -> Result<()> {
        let Some(id) = self.config.policy.select(&self.ready, &self.arena) else {
            return Ok(());
        };

        let pcb = self.arena.get_mut(id);
        let kind = match (pcb.started(), pcb.pid) {
            (true, Some(pid)) => {
                self.workers
                    .resume(pid)
                    .with_context(|| format!("Failed to resume process {}", pcb.id))?;
                TransitionKind::Resumed
            }
            _ => match self.workers.spawn(pcb.remaining) {
                Ok(pid) => {
                    pcb.pid = Some(pid);
                    pcb.start = Some(now);
                    TransitionKind::Started
                }
                Err(e) => {
                    warn!("tick {}: process {} not started: {:#}", now, pcb.id, e);
                    return Ok(());
                }
            },
        };
        pcb.state = ProcState::Running;

        self.ready.remove(id);
        self.running = Some(id);
        self.quantum_used = 0;
        self.record(now, kind, id)
    }

    fn check_end_of_stream(&mut self) {
        if !self.end_of_stream && self.channel.try_recv(MessageKind::End).is_some() {
            info!("end of workload stream");
            self.end_of_stream = true;
        }
    }

    fn accrue_waiting(&mut self) {
        for id in self.ready.iter() {
            self.arena.get_mut(id).waiting += 1;
        }
    }
}
