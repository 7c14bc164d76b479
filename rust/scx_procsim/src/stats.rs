//! Run-end performance statistics.
//!
//! `Metrics` folds in one sample per finished process; `Summary` is the
//! four-line report computed from it at shutdown. Variance is the
//! population variance, E[x²] - E[x]².

use std::fmt;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use crate::pcb::Pcb;
use crate::types::Ticks;

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub waiting_sum: Ticks,
    pub runtime_sum: Ticks,
    pub wta_sum: f64,
    wta_sq_sum: f64,
    pub finished: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a process that just finished.
    pub fn record_finish(&mut self, pcb: &Pcb) {
        let wta = pcb.weighted_turnaround().unwrap_or(0.0);
        self.waiting_sum += pcb.waiting;
        self.runtime_sum += pcb.executed;
        self.wta_sum += wta;
        self.wta_sq_sum += wta * wta;
        self.finished += 1;
    }

    pub fn avg_wta(&self) -> f64 {
        if self.finished == 0 {
            0.0
        } else {
            self.wta_sum / self.finished as f64
        }
    }

    pub fn avg_waiting(&self) -> f64 {
        if self.finished == 0 {
            0.0
        } else {
            self.waiting_sum as f64 / self.finished as f64
        }
    }

    pub fn std_wta(&self) -> f64 {
        if self.finished == 0 {
            0.0
        } else {
            let mean = self.avg_wta();
            let variance = (self.wta_sq_sum / self.finished as f64) - (mean * mean);
            variance.max(0.0).sqrt()
        }
    }

    /// Build the report for a run that lasted `elapsed` ticks.
    pub fn summary(&self, elapsed: Ticks) -> Summary {
        let cpu_utilization = if self.finished == 0 || elapsed == 0 {
            0.0
        } else {
            self.runtime_sum as f64 / elapsed as f64 * 100.0
        };

        Summary {
            cpu_utilization: round2(cpu_utilization),
            avg_wta: round2(self.avg_wta()),
            avg_waiting: round2(self.avg_waiting()),
            std_wta: round2(self.std_wta()),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Final report. Every value is rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    /// Percent of elapsed ticks the CPU spent running a process.
    pub cpu_utilization: f64,
    pub avg_wta: f64,
    pub avg_waiting: f64,
    pub std_wta: f64,
}

impl Summary {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())
            .with_context(|| format!("Failed to write summary {}", path.display()))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU utilization = {:.2}%", self.cpu_utilization)?;
        writeln!(f, "Avg WTA = {:.2}", self.avg_wta)?;
        writeln!(f, "Avg Waiting = {:.2}", self.avg_waiting)?;
        writeln!(f, "Std WTA = {:.2}", self.std_wta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkloadId;
    use crate::workload::Workload;

    fn finished(arrival: Ticks, runtime: Ticks, waiting: Ticks, finish: Ticks) -> Pcb {
        let mut pcb = Pcb::new(&Workload {
            id: WorkloadId(1),
            arrival,
            runtime,
            priority: 0,
        });
        pcb.remaining = 0;
        pcb.executed = runtime;
        pcb.waiting = waiting;
        pcb.finish = Some(finish);
        pcb
    }

    #[test]
    fn test_single_uncontended_process() {
        let mut m = Metrics::new();
        m.record_finish(&finished(0, 5, 0, 5));

        let s = m.summary(5);
        assert_eq!(s.avg_wta, 1.0);
        assert_eq!(s.std_wta, 0.0);
        assert_eq!(s.avg_waiting, 0.0);
        assert_eq!(s.cpu_utilization, 100.0);
    }

    #[test]
    fn test_population_stddev() {
        let mut m = Metrics::new();
        // WTA 1.0 and 3.0 -> mean 2.0, population stddev 1.0
        m.record_finish(&finished(0, 2, 0, 2));
        m.record_finish(&finished(0, 2, 4, 6));

        assert_eq!(m.finished, 2);
        let s = m.summary(6);
        assert_eq!(s.avg_wta, 2.0);
        assert_eq!(s.std_wta, 1.0);
        assert_eq!(s.avg_waiting, 2.0);
        assert_eq!(s.cpu_utilization, 66.67);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let s = Metrics::new().summary(10);
        assert_eq!(s, Summary::default());
    }

    #[test]
    fn test_summary_format() {
        let s = Summary {
            cpu_utilization: 87.5,
            avg_wta: 1.333,
            avg_waiting: 2.0,
            std_wta: 0.25,
        };
        assert_eq!(
            s.to_string(),
            "CPU utilization = 87.50%\nAvg WTA = 1.33\nAvg Waiting = 2.00\nStd WTA = 0.25\n"
        );
    }

    #[test]
    fn test_summary_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.perf");
        Metrics::new().summary(0).write_to(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 4);
    }
}
