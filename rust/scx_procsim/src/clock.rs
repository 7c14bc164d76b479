//! Shared simulation clock.
//!
//! The tick counter lives in a System V shared memory segment as a single
//! `AtomicU64`. The orchestrator creates the segment and every other
//! process attaches to it by segment id. Attachments are read-write; only
//! the clock daemon calls [`ShmClock::advance`].

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::warn;

use crate::types::Ticks;

/// Read access to the current simulated tick.
pub trait Clock {
    fn now(&self) -> Ticks;
}

/// In-process clock driven by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Ticks>,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, tick: Ticks) {
        self.now.set(tick);
    }

    pub fn advance(&self, ticks: Ticks) -> Ticks {
        let next = self.now.get() + ticks;
        self.now.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        self.now.get()
    }
}

/// Tick counter in a System V shared memory segment.
#[derive(Debug)]
pub struct ShmClock {
    shm_id: i32,
    counter: *const AtomicU64,
    owner: bool,
}

impl ShmClock {
    /// Create a fresh segment starting at tick 0. The creator removes the
    /// segment on drop.
    pub fn create() -> Result<Self> {
        let shm_id = unsafe {
            libc::shmget(
                libc::IPC_PRIVATE,
                std::mem::size_of::<AtomicU64>(),
                libc::IPC_CREAT | 0o600,
            )
        };
        if shm_id < 0 {
            return Err(std::io::Error::last_os_error())
                .context("Failed to create clock shared memory segment");
        }

        let clock = Self::map(shm_id, true)?;
        clock.counter().store(0, Ordering::SeqCst);
        debug!("clock segment {} created", shm_id);
        Ok(clock)
    }

    /// Attach to a segment created by another process.
    pub fn attach(shm_id: i32) -> Result<Self> {
        Self::map(shm_id, false)
    }

    fn map(shm_id: i32, owner: bool) -> Result<Self> {
        let addr = unsafe { libc::shmat(shm_id, ptr::null(), 0) };
        if addr as isize == -1 {
            let err = std::io::Error::last_os_error();
            if owner {
                unsafe { libc::shmctl(shm_id, libc::IPC_RMID, ptr::null_mut()) };
            }
            return Err(err)
                .with_context(|| format!("Failed to attach clock segment {}", shm_id));
        }

        // shmat() returns page-aligned memory, which satisfies AtomicU64.
        Ok(Self {
            shm_id,
            counter: addr as *const AtomicU64,
            owner,
        })
    }

    pub fn id(&self) -> i32 {
        self.shm_id
    }

    fn counter(&self) -> &AtomicU64 {
        // SAFETY: `counter` points at a live attachment until drop.
        unsafe { &*self.counter }
    }

    /// Advance the clock by one tick and return the new value.
    pub fn advance(&self) -> Ticks {
        self.counter().fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Clock for ShmClock {
    fn now(&self) -> Ticks {
        self.counter().load(Ordering::SeqCst)
    }
}

impl Drop for ShmClock {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.counter as *const libc::c_void);
            if self.owner && libc::shmctl(self.shm_id, libc::IPC_RMID, ptr::null_mut()) < 0 {
                warn!(
                    "Failed to remove clock segment {}: {}",
                    self.shm_id,
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

/// Clock daemon loop: advance `clock` once per `tick` until `shutdown`.
///
/// Deadlines are scheduled from the start instant so sleep overshoot does
/// not accumulate into drift.
pub fn run_clock(clock: &ShmClock, tick: Duration, shutdown: &AtomicBool) {
    let mut next_at = Instant::now() + tick;

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= next_at {
            let t = clock.advance();
            debug!("tick {}", t);
            next_at += tick;
            if next_at < now {
                next_at = now + tick;
            }
        }

        std::thread::sleep(
            next_at
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(50)),
        );
    }
}
