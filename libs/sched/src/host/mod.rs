//! Host interface used by the scheduler loop.
//!
//! The host abstracts the three OS collaborators the scheduler relies on:
//! - starting a job as an independent process
//! - waiting for any started process to terminate
//! - sampling the system load average
//!
//! [`SystemHost`] talks to the real OS. [`ScriptedHost`] replays a
//! deterministic script on a virtual clock for tests.

mod scripted;
mod system;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LaunchError, SchedError};
use crate::status::Reaped;
use crate::template::Invocation;

pub use scripted::{HostEvent, ScriptedHost, ScriptedJob};
pub use system::SystemHost;

/// Whether a reap may suspend until a child terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapMode {
    /// Wait until any child terminates.
    Blocking,
    /// Return immediately if no child has terminated yet.
    NonBlocking,
}

/// OS collaborators consumed by the scheduler.
#[async_trait]
pub trait ProcessHost: Send {
    /// Start a job and return its pid without waiting for it.
    fn launch(&mut self, invocation: &Invocation) -> Result<u32, LaunchError>;

    /// Collect one terminated child.
    ///
    /// Returns `Ok(None)` when nothing has terminated yet (non-blocking)
    /// or when there are no children at all (either mode). Stopped or
    /// traced children are never reported.
    async fn reap(&mut self, mode: ReapMode) -> Result<Option<Reaped>, SchedError>;

    /// Sample the 1-minute load average, `None` if unavailable.
    fn sample_load(&mut self) -> Option<f64>;

    /// Sleep for `interval` while load-gated. May return early when a child
    /// terminates; callers must still reap to observe completions.
    async fn pause(&mut self, interval: Duration);
}
