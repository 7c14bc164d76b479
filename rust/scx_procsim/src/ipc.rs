//! Type-discriminated message channel.
//!
//! Generator, scheduler and workers talk over one System V message queue.
//! Each message carries a type so receivers can pick the kind they want
//! without disturbing the others:
//!
//! - ARRIVAL (1): `id, arrival, runtime, priority`
//! - END (2): no more arrivals will follow
//! - COMPLETION (3): `pid` of a worker that consumed all of its runtime
//!
//! Receives never block. A failed receive is indistinguishable from an
//! empty queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::warn;

use crate::types::{Pid, WorkloadId};
use crate::workload::Workload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Arrival = 1,
    End = 2,
    Completion = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Arrival(Workload),
    End,
    Completion { pid: Pid },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Arrival(_) => MessageKind::Arrival,
            Message::End => MessageKind::End,
            Message::Completion { .. } => MessageKind::Completion,
        }
    }
}

pub trait Channel {
    fn send(&self, msg: &Message) -> Result<()>;

    /// Take the oldest pending message of `kind`, if any.
    fn try_recv(&self, kind: MessageKind) -> Option<Message>;
}

/// In-process channel with the same by-kind receive semantics.
#[derive(Debug, Clone, Default)]
pub struct LocalChannel {
    queue: Arc<Mutex<VecDeque<Message>>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Channel for LocalChannel {
    fn send(&self, msg: &Message) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| anyhow::anyhow!("local channel poisoned"))?;
        queue.push_back(*msg);
        Ok(())
    }

    fn try_recv(&self, kind: MessageKind) -> Option<Message> {
        let mut queue = self.queue.lock().ok()?;
        let pos = queue.iter().position(|m| m.kind() == kind)?;
        queue.remove(pos)
    }
}

/// Wire layout shared by every message kind.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct RawMessage {
    mtype: libc::c_long,
    body: [i64; 4],
}

const BODY_SIZE: usize = std::mem::size_of::<[i64; 4]>();

impl RawMessage {
    fn encode(msg: &Message) -> Self {
        let body = match *msg {
            Message::Arrival(w) => [
                w.id.0 as i64,
                w.arrival as i64,
                w.runtime as i64,
                w.priority as i64,
            ],
            Message::End => [0; 4],
            Message::Completion { pid } => [pid.0 as i64, 0, 0, 0],
        };

        Self {
            mtype: msg.kind() as libc::c_long,
            body,
        }
    }

    fn decode(&self) -> Option<Message> {
        let b = self.body;
        match self.mtype {
            1 => Some(Message::Arrival(Workload {
                id: WorkloadId(u32::try_from(b[0]).ok()?),
                arrival: u64::try_from(b[1]).ok()?,
                runtime: u64::try_from(b[2]).ok()?,
                priority: i32::try_from(b[3]).ok()?,
            })),
            2 => Some(Message::End),
            3 => Some(Message::Completion {
                pid: Pid(i32::try_from(b[0]).ok()?),
            }),
            _ => None,
        }
    }
}

/// System V message queue handle.
#[derive(Debug)]
pub struct MsgQueue {
    id: i32,
    owner: bool,
}

impl MsgQueue {
    /// Create a private queue. The creator removes it on drop.
    pub fn create() -> Result<Self> {
        let id = unsafe { libc::msgget(libc::IPC_PRIVATE, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            return Err(std::io::Error::last_os_error()).context("Failed to create message queue");
        }
        debug!("message queue {} created", id);
        Ok(Self { id, owner: true })
    }

    /// Use a queue created by another process.
    pub fn attach(id: i32) -> Self {
        Self { id, owner: false }
    }

    pub fn id(&self) -> i32 {
        self.id
    }
}

impl Channel for MsgQueue {
    fn send(&self, msg: &Message) -> Result<()> {
        let raw = RawMessage::encode(msg);
        let ret = unsafe {
            libc::msgsnd(
                self.id,
                &raw as *const RawMessage as *const libc::c_void,
                BODY_SIZE,
                0,
            )
        };
        if ret < 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to send {:?} on queue {}", msg.kind(), self.id));
        }
        Ok(())
    }

    fn try_recv(&self, kind: MessageKind) -> Option<Message> {
        let mut raw = RawMessage::default();
        let ret = unsafe {
            libc::msgrcv(
                self.id,
                &mut raw as *mut RawMessage as *mut libc::c_void,
                BODY_SIZE,
                kind as libc::c_long,
                libc::IPC_NOWAIT,
            )
        };
        if ret < 0 {
            return None;
        }
        raw.decode()
    }
}

impl Drop for MsgQueue {
    fn drop(&mut self) {
        if self.owner && unsafe { libc::msgctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) } < 0
        {
            warn!(
                "Failed to remove message queue {}: {}",
                self.id,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(id: u32) -> Message {
        Message::Arrival(Workload {
            id: WorkloadId(id),
            arrival: id as u64,
            runtime: 3,
            priority: -2,
        })
    }

    #[test]
    fn test_local_receive_by_kind() {
        let ch = LocalChannel::new();
        ch.send(&arrival(1)).unwrap();
        ch.send(&Message::End).unwrap();
        ch.send(&arrival(2)).unwrap();

        assert_eq!(ch.try_recv(MessageKind::Completion), None);
        assert_eq!(ch.try_recv(MessageKind::End), Some(Message::End));
        assert_eq!(ch.try_recv(MessageKind::Arrival), Some(arrival(1)));
        assert_eq!(ch.try_recv(MessageKind::Arrival), Some(arrival(2)));
        assert_eq!(ch.try_recv(MessageKind::Arrival), None);
        assert_eq!(ch.pending(), 0);
    }

    #[test]
    fn test_local_clones_share_queue() {
        let ch = LocalChannel::new();
        let other = ch.clone();
        other
            .send(&Message::Completion { pid: Pid(77) })
            .unwrap();
        assert_eq!(
            ch.try_recv(MessageKind::Completion),
            Some(Message::Completion { pid: Pid(77) })
        );
    }

    #[test]
    fn test_raw_message_layout() {
        let raw = RawMessage::encode(&arrival(4));
        assert_eq!(raw.mtype, 1);
        assert_eq!(raw.body, [4, 4, 3, -2]);
        assert_eq!(raw.decode(), Some(arrival(4)));

        let bogus = RawMessage {
            mtype: 9,
            body: [0; 4],
        };
        assert_eq!(bogus.decode(), None);
    }

    #[test]
    fn test_msg_queue_receive_by_kind() {
        let owner = MsgQueue::create().unwrap();
        let peer = MsgQueue::attach(owner.id());

        owner.send(&arrival(1)).unwrap();
        owner.send(&Message::End).unwrap();
        owner
            .send(&Message::Completion { pid: Pid(77) })
            .unwrap();

        assert_eq!(peer.try_recv(MessageKind::End), Some(Message::End));
        assert_eq!(
            peer.try_recv(MessageKind::Completion),
            Some(Message::Completion { pid: Pid(77) })
        );
        assert_eq!(peer.try_recv(MessageKind::Arrival), Some(arrival(1)));

        for kind in [MessageKind::Arrival, MessageKind::End, MessageKind::Completion] {
            assert_eq!(peer.try_recv(kind), None);
        }
    }

    #[test]
    fn test_msg_queue_removed_by_owner_only() {
        let owner = MsgQueue::create().unwrap();
        let id = owner.id();

        drop(MsgQueue::attach(id));
        owner.send(&Message::End).unwrap();
        assert_eq!(owner.try_recv(MessageKind::End), Some(Message::End));

        drop(owner);
        assert!(MsgQueue::attach(id).send(&Message::End).is_err());
    }
}
