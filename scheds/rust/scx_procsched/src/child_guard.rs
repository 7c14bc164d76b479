use std::process::Child;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::warn;

const GRACE: Duration = Duration::from_millis(500);

/// Owns one role process spawned in its own process group.
///
/// On drop the whole group is stopped: SIGINT, up to 500ms for the role to
/// exit through its ctrlc handler, then SIGKILL. Workers spawned by the
/// scheduler role share its group and go down with it.
pub struct ChildGuard {
    role: &'static str,
    child: Option<Child>,
    pgid: i32,
}

impl ChildGuard {
    /// `child` must have been spawned with `.process_group(0)`.
    pub fn new(role: &'static str, child: Child) -> Self {
        let pgid = child.id() as i32;
        debug!("{} started as pid {}", role, pgid);
        Self {
            role,
            child: Some(child),
            pgid,
        }
    }

    /// Exit status if the role has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child
                .try_wait()
                .with_context(|| format!("Failed to poll {} process", self.role)),
            None => Ok(None),
        }
    }

    pub fn stop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        if let Ok(Some(_)) = child.try_wait() {
            // The leader is gone but stragglers may remain in its group.
            unsafe { libc::killpg(self.pgid, libc::SIGKILL) };
            self.child = None;
            return;
        }

        unsafe { libc::killpg(self.pgid, libc::SIGINT) };

        let deadline = Instant::now() + GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("{} exited ({})", self.role, status);
                    unsafe { libc::killpg(self.pgid, libc::SIGKILL) };
                    self.child = None;
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                _ => break,
            }
        }

        warn!("{} did not exit within {:?}, killing", self.role, GRACE);
        unsafe { libc::killpg(self.pgid, libc::SIGKILL) };
        let _ = child.wait();
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
