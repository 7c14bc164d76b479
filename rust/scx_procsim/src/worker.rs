//! Worker processes.
//!
//! The scheduler side controls workers through [`WorkerControl`]:
//! spawn with a runtime, then PAUSE (SIGSTOP), RESUME (SIGCONT) and
//! TERMINATE (SIGKILL, then reap). [`run_worker`] is the body executed by
//! the worker process itself.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::Child;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::info;
use log::warn;

use crate::clock::Clock;
use crate::ipc::Channel;
use crate::ipc::Message;
use crate::types::{Pid, Ticks};

pub trait WorkerControl {
    /// Start a worker that will consume `runtime` ticks.
    fn spawn(&mut self, runtime: Ticks) -> Result<Pid>;
    fn pause(&mut self, pid: Pid) -> Result<()>;
    fn resume(&mut self, pid: Pid) -> Result<()>;
    /// Kill and reap.
    fn terminate(&mut self, pid: Pid) -> Result<()>;
}

/// Command line used to start a worker. `--runtime N` is appended per
/// spawn.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn build(&self, runtime: Ticks) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--runtime")
            .arg(runtime.to_string());
        cmd
    }
}

/// Workers as real child processes.
#[derive(Debug)]
pub struct ProcessWorkers {
    command: WorkerCommand,
    children: HashMap<Pid, Child>,
}

impl ProcessWorkers {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            children: HashMap::new(),
        }
    }

    /// Number of workers not yet reaped.
    pub fn live(&self) -> usize {
        self.children.len()
    }

    fn signal(pid: Pid, sig: libc::c_int) -> Result<()> {
        if unsafe { libc::kill(pid.0, sig) } < 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to send signal {} to worker {}", sig, pid));
        }
        Ok(())
    }
}

impl WorkerControl for ProcessWorkers {
    fn spawn(&mut self, runtime: Ticks) -> Result<Pid> {
        let child = self
            .command
            .build(runtime)
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", self.command.program))?;
        let pid = Pid(child.id() as i32);
        debug!("worker {} spawned with runtime {}", pid, runtime);
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn pause(&mut self, pid: Pid) -> Result<()> {
        Self::signal(pid, libc::SIGSTOP)
    }

    fn resume(&mut self, pid: Pid) -> Result<()> {
        Self::signal(pid, libc::SIGCONT)
    }

    fn terminate(&mut self, pid: Pid) -> Result<()> {
        let Some(mut child) = self.children.remove(&pid) else {
            return Self::signal(pid, libc::SIGKILL);
        };

        // Fails only if the child is already reaped; wait() still reports it.
        if let Err(e) = child.kill() {
            debug!("kill worker {}: {}", pid, e);
        }
        let status = child
            .wait()
            .with_context(|| format!("Failed to reap worker {}", pid))?;
        match status.code() {
            Some(code) if code != 0 => warn!("worker {} exited with status {}", pid, code),
            _ => debug!("worker {} reaped ({})", pid, status),
        }
        Ok(())
    }
}

impl Drop for ProcessWorkers {
    fn drop(&mut self) {
        for (pid, mut child) in self.children.drain() {
            let _ = child.kill();
            if let Err(e) = child.wait() {
                warn!("Failed to reap worker {}: {}", pid, e);
            }
        }
    }
}

static RESUMED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_resume(_: libc::c_int) {
    RESUMED.store(true, Ordering::SeqCst);
}

/// Mark every SIGCONT so [`run_worker`] can skip the ticks it spent
/// stopped.
pub fn install_resume_handler() -> Result<()> {
    let handler = on_resume as extern "C" fn(libc::c_int) as libc::sighandler_t;
    if unsafe { libc::signal(libc::SIGCONT, handler) } == libc::SIG_ERR {
        bail!(
            "Failed to install SIGCONT handler: {}",
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

/// Consume `runtime` ticks of `clock`, then report completion on
/// `channel`.
///
/// Returns `Ok(false)` if `shutdown` was raised first, in which case no
/// completion is sent.
pub fn run_worker<C, Q>(
    clock: &C,
    channel: &Q,
    runtime: Ticks,
    poll: Duration,
    shutdown: &AtomicBool,
) -> Result<bool>
where
    C: Clock,
    Q: Channel,
{
    let mut remaining = runtime;
    let mut last_seen = clock.now();

    while remaining > 0 {
        if shutdown.load(Ordering::Relaxed) {
            info!("worker {} interrupted with {} ticks left", Pid::current(), remaining);
            return Ok(false);
        }

        let now = clock.now();
        if RESUMED.swap(false, Ordering::SeqCst) {
            last_seen = now;
        } else if now > last_seen {
            remaining = remaining.saturating_sub(now - last_seen);
            last_seen = now;
        }

        if remaining > 0 {
            std::thread::sleep(poll);
        }
    }

    let pid = Pid::current();
    channel.send(&Message::Completion { pid })?;
    debug!("worker {} done at tick {}", pid, last_seen);
    Ok(true)
}
