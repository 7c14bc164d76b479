//! scx_procsim - Single-CPU scheduling simulator driving real worker processes.
//!
//! A shared discrete clock ticks in its own process. A generator feeds
//! workload arrivals through a System V message queue, and the scheduler
//! picks one process at a time to run, starting, pausing, resuming and
//! killing real worker processes as the policy dictates.
//!
//! # Architecture
//!
//! - **Clock**: shared tick counter (`clock`)
//! - **Channel**: type-discriminated arrival/end/completion messages (`ipc`)
//! - **Workers**: OS processes consuming simulated ticks (`worker`)
//! - **Scheduler**: PCB arena, ready queue, dispatch policies and the
//!   per-tick state machine (`pcb`, `queue`, `policy`, `scheduler`)
//! - **Outputs**: transition log and run summary (`trace`, `stats`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use scx_procsim::*;
//!
//! let config = SchedConfig::new(Policy::RoundRobin, Some(2)).unwrap();
//! let clock = ManualClock::new(0);
//! let channel = LocalChannel::new();
//! let workers = ProcessWorkers::new(WorkerCommand::new("/bin/true"));
//! let log = EventLog::new(std::io::sink()).unwrap();
//!
//! let mut sched = Scheduler::new(config, clock, channel, workers, log);
//! sched.tick(0).unwrap();
//! ```

pub mod clock;
pub mod generator;
pub mod ipc;
pub mod pcb;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod trace;
pub mod types;
pub mod worker;
pub mod workload;

pub use clock::{Clock, ManualClock, ShmClock};
pub use generator::run_generator;
pub use ipc::{Channel, LocalChannel, Message, MessageKind, MsgQueue};
pub use pcb::{Pcb, PcbArena, ProcState};
pub use policy::{Policy, SchedConfig};
pub use queue::ReadyQueue;
pub use scheduler::Scheduler;
pub use stats::{Metrics, Summary};
pub use trace::{EventLog, Transition, TransitionKind};
pub use types::{PcbId, Pid, Ticks, WorkloadId};
pub use worker::{ProcessWorkers, WorkerCommand, WorkerControl};
pub use workload::Workload;
