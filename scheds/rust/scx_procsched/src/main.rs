// Copyright (c) The scx_procsched Authors

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
mod child_guard;

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use log::info;
use log::warn;

use scx_procsim::clock::run_clock;
use scx_procsim::worker::{install_resume_handler, run_worker};
use scx_procsim::workload::load_workloads;
use scx_procsim::*;

use child_guard::ChildGuard;

/// scx_procsched: single-CPU scheduling simulator
///
/// Drives real worker processes against a shared tick clock. Workloads are
/// read from a file (`id arrival runtime priority` per line) and dispatched
/// with one of three policies: non-preemptive highest priority first,
/// non-preemptive shortest remaining time, or round robin with a fixed
/// quantum.
///
/// `run` is the entry point. It starts the clock and scheduler roles as
/// child processes, generates arrivals itself, and waits for the scheduler
/// to drain the workload. Every transition is written to the event log and
/// a four-line summary to the perf file.
#[derive(Debug, Parser)]
struct Cli {
    /// Enable verbose output. Specify multiple times to increase verbosity.
    #[clap(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Role,
}

#[derive(Debug, Subcommand)]
enum Role {
    /// Run a workload file end to end.
    Run {
        /// Workload file.
        #[clap(default_value = "processes.txt")]
        workload: PathBuf,

        /// Wall-clock length of one tick, in milliseconds.
        #[clap(short = 't', long, default_value = "1000")]
        tick_ms: u64,

        #[clap(flatten)]
        sched: SchedOpts,
    },

    /// Clock service. Started by `run`.
    #[clap(hide = true)]
    Clock {
        #[clap(long)]
        clock_id: i32,

        #[clap(short = 't', long, default_value = "1000")]
        tick_ms: u64,
    },

    /// Scheduler. Started by `run`.
    #[clap(hide = true)]
    Sched {
        #[clap(long)]
        clock_id: i32,

        #[clap(long)]
        queue_id: i32,

        #[clap(flatten)]
        sched: SchedOpts,
    },

    /// Simulated CPU-bound process. Started by the scheduler.
    #[clap(hide = true)]
    Worker {
        #[clap(long)]
        clock_id: i32,

        #[clap(long)]
        queue_id: i32,

        /// Ticks to consume before reporting completion.
        #[clap(long)]
        runtime: u64,

        #[clap(short = 'p', long, default_value = "10")]
        poll_ms: u64,
    },
}

#[derive(Debug, Clone, Args)]
struct SchedOpts {
    /// Scheduling algorithm: priority (1, hpf), shortest-remaining (2, srt,
    /// sjn) or round-robin (3, rr).
    #[clap(short = 'a', long)]
    algorithm: Policy,

    /// Round robin time slice in ticks. Required for round-robin, ignored
    /// otherwise.
    #[clap(short = 'q', long)]
    quantum: Option<u64>,

    /// Interval between clock polls, in milliseconds.
    #[clap(short = 'p', long, default_value = "10")]
    poll_ms: u64,

    /// Event log path.
    #[clap(long, default_value = "scheduler.log")]
    log: PathBuf,

    /// Summary report path.
    #[clap(long, default_value = "scheduler.perf")]
    perf: PathBuf,
}

impl SchedOpts {
    fn config(&self) -> Result<SchedConfig> {
        SchedConfig::new(self.algorithm, self.quantum)
    }

    fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--algorithm".into(),
            self.algorithm.to_string().into(),
            "--poll-ms".into(),
            self.poll_ms.to_string().into(),
            "--log".into(),
            self.log.clone().into(),
            "--perf".into(),
            self.perf.clone().into(),
        ];
        if let Some(q) = self.quantum {
            args.push("--quantum".into());
            args.push(q.to_string().into());
        }
        args
    }
}

fn verbose_args(verbose: u8) -> impl Iterator<Item = &'static str> {
    std::iter::repeat("-v").take(verbose as usize)
}

fn spawn_role(exe: &Path, role: &'static str, args: &[OsString], verbose: u8) -> Result<ChildGuard> {
    let child = Command::new(exe)
        .args(verbose_args(verbose))
        .arg(role)
        .args(args)
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to start {} process", role))?;
    Ok(ChildGuard::new(role, child))
}

fn run(
    workload: &Path,
    tick_ms: u64,
    opts: &SchedOpts,
    verbose: u8,
    shutdown: &AtomicBool,
) -> Result<()> {
    let workloads = load_workloads(workload)?;
    if workloads.is_empty() {
        bail!("No workloads in {}", workload.display());
    }
    let config = opts.config()?;
    info!(
        "{} workloads from {}, {} (quantum {:?}), {}ms ticks",
        workloads.len(),
        workload.display(),
        config.policy,
        config.quantum,
        tick_ms
    );

    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    let queue = MsgQueue::create()?;
    let clock = ShmClock::create()?;
    let clock_id = clock.id().to_string();
    let queue_id = queue.id().to_string();

    let mut sched_args: Vec<OsString> = vec![
        "--clock-id".into(),
        clock_id.clone().into(),
        "--queue-id".into(),
        queue_id.into(),
    ];
    sched_args.extend(opts.to_args());

    let mut sched = spawn_role(&exe, "sched", &sched_args, verbose)?;
    let _clock_daemon = spawn_role(
        &exe,
        "clock",
        &[
            "--clock-id".into(),
            clock_id.into(),
            "--tick-ms".into(),
            tick_ms.to_string().into(),
        ],
        verbose,
    )?;

    // Stop generating as soon as the scheduler exits.
    run_generator(&workloads, &clock, &queue, opts.poll(), || {
        shutdown.load(Ordering::Relaxed) || !matches!(sched.try_wait(), Ok(None))
    })?;

    loop {
        if let Some(status) = sched.try_wait()? {
            if !status.success() {
                bail!("Scheduler exited with {}", status);
            }
            break;
        }
        if shutdown.load(Ordering::Relaxed) {
            warn!("interrupted, stopping scheduler at tick {}", clock.now());
            break;
        }
        std::thread::sleep(opts.poll());
    }

    info!("finished at tick {}", clock.now());
    Ok(())
}

fn sched(clock_id: i32, queue_id: i32, opts: &SchedOpts, verbose: u8, shutdown: &AtomicBool) -> Result<()> {
    let config = opts.config()?;
    let clock = ShmClock::attach(clock_id)?;
    let channel = MsgQueue::attach(queue_id);
    let log = EventLog::create(&opts.log)?;

    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    let mut command = WorkerCommand::new(exe);
    for v in verbose_args(verbose) {
        command = command.arg(v);
    }
    let command = command
        .arg("worker")
        .arg("--clock-id")
        .arg(clock_id.to_string())
        .arg("--queue-id")
        .arg(queue_id.to_string())
        .arg("--poll-ms")
        .arg(opts.poll_ms.to_string());

    let mut scheduler = Scheduler::new(config, clock, channel, ProcessWorkers::new(command), log)
        .with_poll(opts.poll());
    let summary = scheduler.run(shutdown)?;

    for line in summary.to_string().lines() {
        info!("{}", line);
    }
    if let Err(e) = summary.write_to(&opts.perf) {
        warn!("{:#}", e);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let llv = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    match &cli.command {
        Role::Run {
            workload,
            tick_ms,
            sched: opts,
        } => run(workload, *tick_ms, opts, cli.verbose, &shutdown),
        Role::Clock { clock_id, tick_ms } => {
            let clock = ShmClock::attach(*clock_id)?;
            run_clock(&clock, Duration::from_millis(*tick_ms), &shutdown);
            Ok(())
        }
        Role::Sched {
            clock_id,
            queue_id,
            sched: opts,
        } => sched(*clock_id, *queue_id, opts, cli.verbose, &shutdown),
        Role::Worker {
            clock_id,
            queue_id,
            runtime,
            poll_ms,
        } => {
            install_resume_handler()?;
            let clock = ShmClock::attach(*clock_id)?;
            let channel = MsgQueue::attach(*queue_id);
            run_worker(
                &clock,
                &channel,
                *runtime,
                Duration::from_millis(*poll_ms),
                &shutdown,
            )?;
            Ok(())
        }
    }
}
