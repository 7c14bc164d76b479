//! Dispatch policies.
//!
//! Each policy looks at the ready queue and returns at most one PCB to run
//! next. Ties always go to the earliest arrival, then to queue order.
//!
//! Policies are only consulted while the CPU is idle. Priority and
//! shortest-remaining-time therefore never preempt a running process;
//! only round robin preempts, through the quantum counter in the
//! scheduler.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Result;
use log::warn;

use crate::pcb::PcbArena;
use crate::queue::ReadyQueue;
use crate::types::{PcbId, Ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Highest priority first (lowest priority value).
    Priority,
    /// Shortest remaining time first.
    ShortestRemaining,
    /// FIFO with quantum-based preemption.
    RoundRobin,
}

impl Policy {
    /// Pick the next PCB to run from `queue`.
    pub fn select(self, queue: &ReadyQueue, arena: &PcbArena) -> Option<PcbId> {
        match self {
            Policy::Priority => queue.iter().min_by_key(|&id| {
                let pcb = arena.get(id);
                (pcb.priority, pcb.arrival)
            }),
            Policy::ShortestRemaining => queue.iter().min_by_key(|&id| {
                let pcb = arena.get(id);
                (pcb.remaining, pcb.arrival)
            }),
            Policy::RoundRobin => queue.peek(),
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "hpf" | "priority" => Ok(Policy::Priority),
            "2" | "sjn" | "srt" | "shortest-remaining" => Ok(Policy::ShortestRemaining),
            "3" | "rr" | "round-robin" => Ok(Policy::RoundRobin),
            _ => Err(format!(
                "unknown algorithm {s:?} (expected priority, shortest-remaining or round-robin)"
            )),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Policy::Priority => "priority",
            Policy::ShortestRemaining => "shortest-remaining",
            Policy::RoundRobin => "round-robin",
        };
        f.write_str(s)
    }
}

/// Validated scheduler launch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    pub policy: Policy,
    /// Round robin time slice. `None` for the other policies.
    pub quantum: Option<Ticks>,
}

impl SchedConfig {
    pub fn new(policy: Policy, quantum: Option<Ticks>) -> Result<Self> {
        match (policy, quantum) {
            (Policy::RoundRobin, Some(q)) if q > 0 => Ok(Self {
                policy,
                quantum: Some(q),
            }),
            (Policy::RoundRobin, _) => bail!("round-robin requires a positive quantum"),
            (_, Some(q)) => {
                warn!("quantum {} ignored by the {} policy", q, policy);
                Ok(Self {
                    policy,
                    quantum: None,
                })
            }
            (_, None) => Ok(Self {
                policy,
                quantum: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::Pcb;
    use crate::types::WorkloadId;
    use crate::workload::Workload;

    fn ready_set(entries: &[(u32, i32, Ticks, Ticks)]) -> (PcbArena, ReadyQueue) {
        let mut arena = PcbArena::new();
        let mut queue = ReadyQueue::new();
        for &(id, priority, arrival, runtime) in entries {
            let slot = arena.insert(Pcb::new(&Workload {
                id: WorkloadId(id),
                arrival,
                runtime,
                priority,
            }));
            queue.enqueue(slot);
        }
        (arena, queue)
    }

    fn selected_id(policy: Policy, arena: &PcbArena, queue: &ReadyQueue) -> Option<u32> {
        policy.select(queue, arena).map(|slot| arena.get(slot).id.0)
    }

    #[test]
    fn test_priority_tie_breaks_on_arrival() {
        // (id, priority, arrival, runtime)
        let (arena, queue) = ready_set(&[(1, 3, 0, 4), (2, 1, 1, 4), (3, 1, 0, 4)]);
        assert_eq!(selected_id(Policy::Priority, &arena, &queue), Some(3));
    }

    #[test]
    fn test_priority_full_tie_keeps_queue_order() {
        let (arena, queue) = ready_set(&[(5, 2, 0, 4), (6, 2, 0, 1)]);
        assert_eq!(selected_id(Policy::Priority, &arena, &queue), Some(5));
    }

    #[test]
    fn test_shortest_remaining_tie_breaks_on_arrival() {
        let (arena, queue) = ready_set(&[(1, 0, 0, 5), (2, 0, 2, 3), (3, 0, 1, 3)]);
        assert_eq!(selected_id(Policy::ShortestRemaining, &arena, &queue), Some(3));
    }

    #[test]
    fn test_shortest_remaining_uses_updated_remaining() {
        let (mut arena, queue) = ready_set(&[(1, 0, 0, 8), (2, 0, 0, 4)]);
        // Process 1 already ran 6 of its 8 ticks before being re-queued.
        arena.get_mut(PcbId(0)).remaining = 2;
        assert_eq!(selected_id(Policy::ShortestRemaining, &arena, &queue), Some(1));
    }

    #[test]
    fn test_round_robin_takes_head() {
        let (arena, queue) = ready_set(&[(9, 5, 3, 1), (1, 0, 0, 1)]);
        assert_eq!(selected_id(Policy::RoundRobin, &arena, &queue), Some(9));
    }

    #[test]
    fn test_select_on_empty_queue() {
        let arena = PcbArena::new();
        let queue = ReadyQueue::new();
        for policy in [Policy::Priority, Policy::ShortestRemaining, Policy::RoundRobin] {
            assert_eq!(policy.select(&queue, &arena), None);
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("1".parse::<Policy>(), Ok(Policy::Priority));
        assert_eq!("HPF".parse::<Policy>(), Ok(Policy::Priority));
        assert_eq!("srt".parse::<Policy>(), Ok(Policy::ShortestRemaining));
        assert_eq!("round-robin".parse::<Policy>(), Ok(Policy::RoundRobin));
        assert!("4".parse::<Policy>().is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(SchedConfig::new(Policy::RoundRobin, None).is_err());
        assert!(SchedConfig::new(Policy::RoundRobin, Some(0)).is_err());
        assert_eq!(
            SchedConfig::new(Policy::RoundRobin, Some(3)).unwrap().quantum,
            Some(3)
        );
        assert_eq!(
            SchedConfig::new(Policy::Priority, Some(3)).unwrap().quantum,
            None
        );
    }
}
