//! Workload generator loop.

use std::time::Duration;

use anyhow::Result;
use log::debug;
use log::info;
use log::warn;

use crate::clock::Clock;
use crate::ipc::Channel;
use crate::ipc::Message;
use crate::workload::Workload;

/// Send each workload as an ARRIVAL once `clock` reaches its arrival tick,
/// then a single END.
///
/// `workloads` must be sorted by arrival. `stop` is checked once per poll
/// while arrivals are still pending; if it returns true, generation ends
/// without END. Returns the number of arrivals sent.
pub fn run_generator<C, Q, S>(
    workloads: &[Workload],
    clock: &C,
    channel: &Q,
    poll: Duration,
    mut stop: S,
) -> Result<usize>
where
    C: Clock,
    Q: Channel,
    S: FnMut() -> bool,
{
    let mut pending = workloads.iter().peekable();
    let mut sent = 0;

    loop {
        let now = clock.now();
        while let Some(w) = pending.next_if(|w| w.arrival <= now) {
            channel.send(&Message::Arrival(*w))?;
            debug!(
                "tick {}: sent arrival of process {} (arr {} runtime {} prio {})",
                now, w.id, w.arrival, w.runtime, w.priority
            );
            sent += 1;
        }

        if pending.peek().is_none() {
            break;
        }
        if stop() {
            warn!("generator stopped after {} of {} arrivals", sent, workloads.len());
            return Ok(sent);
        }
        std::thread::sleep(poll);
    }

    channel.send(&Message::End)?;
    info!("all {} arrivals sent", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::clock::ManualClock;
    use crate::ipc::LocalChannel;
    use crate::ipc::MessageKind;
    use crate::types::WorkloadId;

    fn workload(id: u32, arrival: u64) -> Workload {
        Workload {
            id: WorkloadId(id),
            arrival,
            runtime: 2,
            priority: 0,
        }
    }

    #[test]
    fn test_due_arrivals_then_end() {
        let clock = ManualClock::new(10);
        let channel = LocalChannel::new();
        let workloads = [workload(1, 0), workload(2, 3), workload(3, 3)];

        let sent = run_generator(&workloads, &clock, &channel, Duration::ZERO, || false)
            .unwrap();
        assert_eq!(sent, 3);

        for id in 1..=3 {
            match channel.try_recv(MessageKind::Arrival) {
                Some(Message::Arrival(w)) => assert_eq!(w.id, WorkloadId(id)),
                other => panic!("expected arrival {id}, got {other:?}"),
            }
        }
        assert_eq!(channel.try_recv(MessageKind::End), Some(Message::End));
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_future_arrivals_held_when_stopped() {
        let clock = ManualClock::new(1);
        let channel = LocalChannel::new();
        let workloads = [workload(1, 0), workload(2, 5)];

        let sent = run_generator(&workloads, &clock, &channel, Duration::ZERO, || true)
            .unwrap();
        assert_eq!(sent, 1);
        assert!(channel.try_recv(MessageKind::Arrival).is_some());
        assert_eq!(channel.try_recv(MessageKind::End), None);
    }

    #[test]
    fn test_empty_workload_sends_end() {
        let clock = ManualClock::new(0);
        let channel = LocalChannel::new();

        let sent = run_generator(&[], &clock, &channel, Duration::ZERO, || false).unwrap();
        assert_eq!(sent, 0);
        assert_eq!(channel.try_recv(MessageKind::End), Some(Message::End));
    }

    #[test]
    fn test_stop_check_ends_generation_early() {
        let clock = ManualClock::new(0);
        let channel = LocalChannel::new();
        let checks = Cell::new(0);
        let workloads = [workload(1, 0), workload(2, 1000)];

        // Stands in for a consumer that exits while arrivals are pending.
        let sent = run_generator(&workloads, &clock, &channel, Duration::ZERO, || {
            checks.set(checks.get() + 1);
            checks.get() == 3
        })
        .unwrap();

        assert_eq!(sent, 1);
        assert_eq!(checks.get(), 3);
        assert!(channel.try_recv(MessageKind::Arrival).is_some());
        assert_eq!(channel.try_recv(MessageKind::Arrival), None);
        assert_eq!(channel.try_recv(MessageKind::End), None);
    }

    #[test]
    fn test_stop_check_unused_once_all_sent() {
        let clock = ManualClock::new(5);
        let channel = LocalChannel::new();

        let sent = run_generator(&[workload(1, 5)], &clock, &channel, Duration::ZERO, || {
            panic!("stop checked with nothing pending")
        })
        .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(channel.try_recv(MessageKind::End), Some(Message::End));
    }
}
