//! Host backed by real processes.

use std::process::Command;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, trace, warn};

use super::{ProcessHost, ReapMode};
use crate::error::{LaunchError, SchedError};
use crate::resources;
use crate::status::{Reaped, Termination};
use crate::template::Invocation;

/// Spawns jobs with `std::process` and reaps them with `waitpid(-1)`.
///
/// Children inherit stdin, stdout and stderr. Nothing else in the process
/// may wait on children while a `SystemHost` is in use, since reaping is
/// "any child".
pub struct SystemHost {
    /// SIGCHLD stream used only to cut load-gated sleeps short.
    sigchld: Option<Signal>,
}

impl SystemHost {
    /// Create a host. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let sigchld = match signal(SignalKind::child()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "SIGCHLD listener unavailable, load polling will not wake early");
                None
            }
        };

        Self { sigchld }
    }

    /// Discard SIGCHLD notifications already queued, so a child that has
    /// been collected does not end the next load wait early.
    fn drain_sigchld(&mut self) {
        let Some(sigchld) = self.sigchld.as_mut() else {
            return;
        };

        let mut cx = Context::from_waker(Waker::noop());
        loop {
            match sigchld.poll_recv(&mut cx) {
                Poll::Ready(Some(())) => {}
                Poll::Ready(None) => {
                    debug!("SIGCHLD stream closed, falling back to plain sleeps");
                    self.sigchld = None;
                    return;
                }
                Poll::Pending => return,
            }
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessHost for SystemHost {
    // The child handle is dropped on purpose; the process is collected by
    // `reap` through waitpid(-1).
    #[allow(clippy::zombie_processes)]
    fn launch(&mut self, invocation: &Invocation) -> Result<u32, LaunchError> {
        let program = invocation.program();

        let child = Command::new(program)
            .args(invocation.args())
            .spawn()
            .map_err(|e| LaunchError::new(program, e))?;

        Ok(child.id())
    }

    async fn reap(&mut self, mode: ReapMode) -> Result<Option<Reaped>, SchedError> {
        match mode {
            ReapMode::NonBlocking => wait_any(Some(WaitPidFlag::WNOHANG)),
            ReapMode::Blocking => {
                let reaped = tokio::task::spawn_blocking(|| wait_any(None))
                    .await
                    .map_err(|e| SchedError::Io(std::io::Error::other(e)))??;
                // Let the signal driver pick up the exit before draining.
                tokio::task::yield_now().await;
                self.drain_sigchld();
                Ok(reaped)
            }
        }
    }

    fn sample_load(&mut self) -> Option<f64> {
        resources::load_average()
    }

    async fn pause(&mut self, interval: Duration) {
        let Some(sigchld) = self.sigchld.as_mut() else {
            tokio::time::sleep(interval).await;
            return;
        };

        let closed = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            received = sigchld.recv() => {
                trace!("load wait woken by SIGCHLD");
                received.is_none()
            }
        };

        if closed {
            debug!("SIGCHLD stream closed, falling back to plain sleeps");
            self.sigchld = None;
        }
    }
}

/// Wait for any child, skipping non-terminal states.
fn wait_any(flags: Option<WaitPidFlag>) -> Result<Option<Reaped>, SchedError> {
    loop {
        match waitpid(Pid::from_raw(-1), flags) {
            Ok(WaitStatus::Exited(pid, code)) => {
                return Ok(Some(Reaped {
                    pid: pid.as_raw() as u32,
                    termination: Termination::Exited(code),
                }));
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                return Ok(Some(Reaped {
                    pid: pid.as_raw() as u32,
                    termination: Termination::Signaled(sig as i32),
                }));
            }
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(other) => {
                // Stopped, traced or continued: not a completion.
                trace!(status = ?other, "ignoring non-terminal wait status");
            }
            Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}
