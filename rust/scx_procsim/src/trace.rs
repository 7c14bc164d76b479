//! Transition log.
//!
//! Every start, stop, resume and finish is recorded as a `Transition` and
//! written as one line to the event log:
//!
//! ```text
//! At time 5 process 1 finished arr 0 total 5 remain 0 wait 0 TA 5 WTA 1.00
//! ```
//!
//! Records are also kept in memory so a run can be inspected afterwards.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use crate::pcb::Pcb;
use crate::types::{Ticks, WorkloadId};

const LOG_HEADER: &str = "#At time x process y state arr w total z remain y wait k";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Started,
    Stopped,
    Resumed,
    Finished,
}

impl TransitionKind {
    pub fn label(self) -> &'static str {
        match self {
            TransitionKind::Started => "started",
            TransitionKind::Stopped => "stopped",
            TransitionKind::Resumed => "resumed",
            TransitionKind::Finished => "finished",
        }
    }
}

/// One state transition, snapshotting the PCB counters at that tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub tick: Ticks,
    pub id: WorkloadId,
    pub kind: TransitionKind,
    pub arrival: Ticks,
    pub runtime: Ticks,
    pub remaining: Ticks,
    pub waiting: Ticks,
    /// Turnaround and weighted turnaround, finish records only.
    pub turnaround: Option<(Ticks, f64)>,
}

impl Transition {
    pub fn new(tick: Ticks, kind: TransitionKind, pcb: &Pcb) -> Self {
        let turnaround = match kind {
            TransitionKind::Finished => pcb.turnaround().zip(pcb.weighted_turnaround()),
            _ => None,
        };

        Self {
            tick,
            id: pcb.id,
            kind,
            arrival: pcb.arrival,
            runtime: pcb.runtime,
            remaining: pcb.remaining,
            waiting: pcb.waiting,
            turnaround,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At time {} process {} {} arr {} total {} remain {} wait {}",
            self.tick,
            self.id,
            self.kind.label(),
            self.arrival,
            self.runtime,
            self.remaining,
            self.waiting
        )?;
        if let Some((ta, wta)) = self.turnaround {
            write!(f, " TA {} WTA {:.2}", ta, wta)?;
        }
        Ok(())
    }
}

/// Append-only transition log backed by any writer.
pub struct EventLog<W: Write> {
    out: W,
    records: Vec<Transition>,
}

impl EventLog<BufWriter<File>> {
    /// Create (truncate) the event log file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> EventLog<W> {
    /// Wrap `out` and write the header line.
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "{}", LOG_HEADER).context("Failed to write event log header")?;
        out.flush()?;
        Ok(Self {
            out,
            records: Vec::new(),
        })
    }

    /// Write one record and flush it.
    pub fn record(&mut self, transition: Transition) -> Result<()> {
        writeln!(self.out, "{}", transition).context("Failed to write event log")?;
        self.out.flush().context("Failed to flush event log")?;
        self.records.push(transition);
        Ok(())
    }

    pub fn records(&self) -> &[Transition] {
        &self.records
    }

    /// Number of records of `kind`.
    pub fn count(&self, kind: TransitionKind) -> usize {
        self.records.iter().filter(|t| t.kind == kind).count()
    }

    /// Records for one workload, in order.
    pub fn history(&self, id: WorkloadId) -> impl Iterator<Item = &Transition> {
        self.records.iter().filter(move |t| t.id == id)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
