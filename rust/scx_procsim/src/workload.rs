//! Workload descriptors and the workload file format.
//!
//! One entry per line: `id arrival runtime priority`, separated by tabs or
//! spaces. Lines starting with `#` and blank lines are skipped.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use log::warn;

use crate::types::{Ticks, WorkloadId};

/// An immutable workload entry. Lower `priority` values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    pub id: WorkloadId,
    pub arrival: Ticks,
    pub runtime: Ticks,
    pub priority: i32,
}

fn parse_line(line: &str) -> Option<Workload> {
    let mut fields = line.split_whitespace();
    let id = fields.next()?.parse().ok()?;
    let arrival = fields.next()?.parse().ok()?;
    let runtime = fields.next()?.parse().ok()?;
    let priority = fields.next()?.parse().ok()?;

    Some(Workload {
        id: WorkloadId(id),
        arrival,
        runtime,
        priority,
    })
}

/// Parse workload text. Malformed lines and zero-runtime entries are
/// skipped with a warning. The result is stably sorted by arrival so the
/// generator can emit it in one pass.
pub fn parse_workloads(text: &str) -> Vec<Workload> {
    let mut workloads = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Some(w) if w.runtime == 0 => {
                warn!("line {}: process {} has zero runtime, skipping", lineno + 1, w.id);
            }
            Some(w) => workloads.push(w),
            None => warn!("line {}: malformed entry {:?}, skipping", lineno + 1, line),
        }
    }

    workloads.sort_by_key(|w| w.arrival);
    workloads
}

/// Read and parse a workload file.
pub fn load_workloads(path: &Path) -> Result<Vec<Workload>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workload file {}", path.display()))?;
    Ok(parse_workloads(&text))
}
