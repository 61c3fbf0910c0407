//! Deterministic in-memory host for tests and dry runs.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;

use super::{ProcessHost, ReapMode};
use crate::error::{LaunchError, SchedError};
use crate::status::{Reaped, Termination};
use crate::template::Invocation;

/// Scripted behavior of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedJob {
    /// How the job ends; `LaunchFailed` makes `launch` return an error.
    pub termination: Termination,

    /// Virtual run time in milliseconds.
    pub runtime_ms: u64,
}

impl ScriptedJob {
    pub fn exit(code: i32, runtime_ms: u64) -> Self {
        Self {
            termination: Termination::Exited(code),
            runtime_ms,
        }
    }

    pub fn signaled(signal: i32, runtime_ms: u64) -> Self {
        Self {
            termination: Termination::Signaled(signal),
            runtime_ms,
        }
    }

    pub fn launch_failure() -> Self {
        Self {
            termination: Termination::LaunchFailed,
            runtime_ms: 0,
        }
    }
}

/// Something the scheduler asked the host to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Launched {
        pid: u32,
        invocation: Invocation,
        running: usize,
    },
    LaunchFailed {
        invocation: Invocation,
    },
    Reaped(Reaped),
    LoadSampled(Option<f64>),
    Paused,
}

#[derive(Debug)]
struct RunningJob {
    pid: u32,
    finish_at: u64,
    termination: Termination,
}

type Script = Box<dyn FnMut(&Invocation) -> ScriptedJob + Send>;

/// Host that simulates processes on a virtual millisecond clock.
///
/// Blocking reaps advance the clock to the earliest finishing job; pauses
/// advance it by the pause interval. Load samples are taken from a queue,
/// repeating the last value once the queue runs dry.
pub struct ScriptedHost {
    script: Script,
    loads: VecDeque<Option<f64>>,
    last_load: Option<f64>,
    clock_ms: u64,
    next_pid: u32,
    running: Vec<RunningJob>,
    events: Vec<HostEvent>,
    peak_running: usize,
}

impl ScriptedHost {
    /// Create a host where `script` decides each launched job's fate.
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(&Invocation) -> ScriptedJob + Send + 'static,
    {
        Self {
            script: Box::new(script),
            loads: VecDeque::new(),
            last_load: None,
            clock_ms: 0,
            next_pid: 1000,
            running: Vec::new(),
            events: Vec::new(),
            peak_running: 0,
        }
    }

    /// Host where every job exits 0 after `runtime_ms`.
    pub fn succeeding(runtime_ms: u64) -> Self {
        Self::new(move |_| ScriptedJob::exit(0, runtime_ms))
    }

    /// Queue load samples returned by successive `sample_load` calls.
    pub fn with_loads(mut self, loads: impl IntoIterator<Item = Option<f64>>) -> Self {
        self.loads.extend(loads);
        self
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    /// Invocations that were successfully launched, in launch order.
    pub fn launched(&self) -> Vec<&Invocation> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HostEvent::Launched { invocation, .. } => Some(invocation),
                _ => None,
            })
            .collect()
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Remove and return the earliest finishing job, if `ready` accepts it.
    fn take_earliest(&mut self, ready: impl Fn(u64) -> bool) -> Option<Reaped> {
        let (idx, job) = self
            .running
            .iter()
            .enumerate()
            .min_by_key(|(_, job)| (job.finish_at, job.pid))?;

        if !ready(job.finish_at) {
            return None;
        }

        let job = self.running.remove(idx);
        self.clock_ms = self.clock_ms.max(job.finish_at);
        Some(Reaped {
            pid: job.pid,
            termination: job.termination,
        })
    }
}

#[async_trait]
impl ProcessHost for ScriptedHost {
    fn launch(&mut self, invocation: &Invocation) -> Result<u32, LaunchError> {
        let job = (self.script)(invocation);

        if job.termination == Termination::LaunchFailed {
            self.events.push(HostEvent::LaunchFailed {
                invocation: invocation.clone(),
            });
            return Err(LaunchError::new(
                invocation.program(),
                io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"),
            ));
        }

        let pid = self.next_pid;
        self.next_pid += 1;
        self.running.push(RunningJob {
            pid,
            finish_at: self.clock_ms + job.runtime_ms,
            termination: job.termination,
        });
        self.peak_running = self.peak_running.max(self.running.len());
        self.events.push(HostEvent::Launched {
            pid,
            invocation: invocation.clone(),
            running: self.running.len(),
        });

        Ok(pid)
    }

    async fn reap(&mut self, mode: ReapMode) -> Result<Option<Reaped>, SchedError> {
        let now = self.clock_ms;
        let reaped = match mode {
            ReapMode::Blocking => self.take_earliest(|_| true),
            ReapMode::NonBlocking => self.take_earliest(|finish_at| finish_at <= now),
        };

        if let Some(reaped) = reaped {
            self.events.push(HostEvent::Reaped(reaped));
        }
        Ok(reaped)
    }

    fn sample_load(&mut self) -> Option<f64> {
        if let Some(load) = self.loads.pop_front() {
            self.last_load = load;
        }
        self.events.push(HostEvent::LoadSampled(self.last_load));
        self.last_load
    }

    async fn pause(&mut self, interval: Duration) {
        self.clock_ms += interval.as_millis() as u64;
        self.events.push(HostEvent::Paused);
    }
}
