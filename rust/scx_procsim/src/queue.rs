//! Ready queue.
//!
//! A pure FIFO of arena handles. Ownership of the PCBs stays with the
//! arena; the queue only orders them. Policy logic lives in `policy`.

use std::collections::VecDeque;

use crate::types::PcbId;

#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: VecDeque<PcbId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail.
    ///
    /// # Panics
    /// Panics in debug builds if `id` is already queued; a PCB may appear
    /// at most once.
    pub fn enqueue(&mut self, id: PcbId) {
        debug_assert!(!self.contains(id), "{id:?} already in the ready queue");
        self.entries.push_back(id);
    }

    /// Remove and return the head.
    pub fn dequeue(&mut self) -> Option<PcbId> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<PcbId> {
        self.entries.front().copied()
    }

    /// Unlink `id` wherever it sits. Returns true if it was queued.
    pub fn remove(&mut self, id: PcbId) -> bool {
        match self.entries.iter().position(|&e| e == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: PcbId) -> bool {
        self.entries.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in queue order, head first.
    pub fn iter(&self) -> impl Iterator<Item = PcbId> + '_ {
        self.entries.iter().copied()
    }
}
