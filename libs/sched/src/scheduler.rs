//! The scheduler loop.
//!
//! A single sequential state machine owns all bookkeeping:
//!
//! ```text
//! FILLING --admit--> FILLING
//! FILLING --blocked on count--> WAITING (blocking reap) --> FILLING
//! FILLING --blocked on load--> WAITING (pause, non-blocking reap) --> FILLING
//! FILLING --stream exhausted--> DRAINING --outstanding == 0--> DONE
//! ```
//!
//! Batches are admitted strictly in input order; jobs are reaped in
//! whatever order they terminate.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionPolicy};
use crate::batch::{Batch, Batches};
use crate::config::SchedulerConfig;
use crate::error::SchedError;
use crate::host::{ProcessHost, ReapMode};
use crate::resources;
use crate::status::{ExitAccumulator, Reaped, Termination};
use crate::template::{CommandTemplate, Invocation};

/// Sleep between load samples while load-gated.
pub const LOAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduler loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Filling,
    Waiting(Blocked),
    Draining,
    Done,
}

/// Why the loop left `Filling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    Count,
    Load,
}

/// A job in flight. Its argv is released when the job is reaped.
#[derive(Debug)]
struct Job {
    batch: usize,
    invocation: Invocation,
}

/// Summary produced once the loop reaches `Done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Bitwise OR of every job's normalized code.
    pub exit_code: i32,

    /// Jobs successfully started.
    pub launched: usize,

    /// Jobs that could not be started.
    pub launch_failures: usize,

    /// Jobs reaped.
    pub completed: usize,

    /// Highest number of simultaneously outstanding jobs.
    pub peak_outstanding: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command template over an argument stream.
pub struct Scheduler<H> {
    host: H,
    template: CommandTemplate,
    policy: AdmissionPolicy,
    batch_size: NonZeroUsize,
    /// Outstanding jobs keyed by pid; its length is the outstanding count.
    jobs: HashMap<u32, Job>,
    exit: ExitAccumulator,
    report: RunReport,
}

impl<H: ProcessHost> Scheduler<H> {
    /// Validate `config` and build a scheduler. Without explicit limits the
    /// concurrency limit is the number of logical CPUs.
    pub fn new(config: &SchedulerConfig, host: H) -> Result<Self, SchedError> {
        let batch_size = config.validate()?;
        let policy = config.admission_policy(resources::cpu_count());
        let template = config.template();

        debug!(
            concurrency_limit = policy.concurrency_limit,
            load_ceiling = ?policy.load_ceiling,
            batch_size = batch_size.get(),
            mode = ?template.mode(),
            "scheduler configured"
        );

        Ok(Self {
            host,
            template,
            policy,
            batch_size,
            jobs: HashMap::new(),
            exit: ExitAccumulator::new(),
            report: RunReport::default(),
        })
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn outstanding(&self) -> usize {
        self.jobs.len()
    }

    /// Run every batch of `args` to completion and report the result.
    pub async fn run<I>(&mut self, args: I) -> Result<RunReport, SchedError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut batches = Batches::new(args.into_iter(), self.batch_size);
        let mut pending: Option<Batch> = None;
        let mut phase = Phase::Filling;

        while phase != Phase::Done {
            phase = match phase {
                Phase::Filling => match pending.take().or_else(|| batches.next()) {
                    None => Phase::Draining,
                    Some(batch) => match self.admit() {
                        Admission::Admit => {
                            self.launch(batch);
                            Phase::Filling
                        }
                        Admission::BlockedOnCount => {
                            pending = Some(batch);
                            Phase::Waiting(Blocked::Count)
                        }
                        Admission::BlockedOnLoad { load } => {
                            debug!(
                                load,
                                ceiling = ?self.policy.load_ceiling,
                                outstanding = self.outstanding(),
                                "admission blocked on load"
                            );
                            pending = Some(batch);
                            Phase::Waiting(Blocked::Load)
                        }
                    },
                },
                Phase::Waiting(Blocked::Count) => {
                    self.reap_blocking().await?;
                    Phase::Filling
                }
                Phase::Waiting(Blocked::Load) => {
                    self.host.pause(LOAD_POLL_INTERVAL).await;
                    if let Some(reaped) = self.host.reap(ReapMode::NonBlocking).await? {
                        self.complete(reaped);
                    }
                    Phase::Filling
                }
                Phase::Draining => {
                    if self.jobs.is_empty() {
                        Phase::Done
                    } else {
                        self.reap_blocking().await?;
                        Phase::Draining
                    }
                }
                Phase::Done => Phase::Done,
            };
        }

        self.report.exit_code = self.exit.code();
        info!(
            exit_code = self.report.exit_code,
            launched = self.report.launched,
            launch_failures = self.report.launch_failures,
            completed = self.report.completed,
            peak_outstanding = self.report.peak_outstanding,
            "all jobs finished"
        );

        Ok(self.report)
    }

    fn admit(&mut self) -> Admission {
        let host = &mut self.host;
        self.policy.check(self.jobs.len(), || host.sample_load())
    }

    fn launch(&mut self, batch: Batch) {
        let invocation = self.template.build(&batch.args);

        match self.host.launch(&invocation) {
            Ok(pid) => {
                debug!(
                    batch = batch.index,
                    pid,
                    program = invocation.program(),
                    args = ?invocation.args(),
                    "job started"
                );
                self.jobs.insert(
                    pid,
                    Job {
                        batch: batch.index,
                        invocation,
                    },
                );
                self.report.launched += 1;
                self.report.peak_outstanding = self.report.peak_outstanding.max(self.jobs.len());
            }
            Err(e) => {
                warn!(batch = batch.index, error = %e, "job failed to launch");
                self.exit.record(Termination::LaunchFailed);
                self.report.launch_failures += 1;
            }
        }
    }

    async fn reap_blocking(&mut self) -> Result<(), SchedError> {
        match self.host.reap(ReapMode::Blocking).await? {
            Some(reaped) => {
                self.complete(reaped);
                Ok(())
            }
            None => Err(SchedError::LostChildren {
                outstanding: self.jobs.len(),
            }),
        }
    }

    fn complete(&mut self, reaped: Reaped) {
        let Some(job) = self.jobs.remove(&reaped.pid) else {
            warn!(pid = reaped.pid, "reaped a child that is not a job");
            return;
        };

        if reaped.termination.is_success() {
            debug!(pid = reaped.pid, batch = job.batch, "job finished");
        } else {
            debug!(
                pid = reaped.pid,
                batch = job.batch,
                program = job.invocation.program(),
                status = %reaped.termination,
                "job failed"
            );
        }

        self.exit.record(reaped.termination);
        self.report.completed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostEvent, ScriptedHost, ScriptedJob};
    use crate::status::{LAUNCH_FAILED, SIGNALED};
    use crate::template::DEFAULT_SHELL;
    use proptest::prelude::*;

    fn config(command: &[&str], max_jobs: Option<usize>) -> SchedulerConfig {
        SchedulerConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            max_jobs,
            ..Default::default()
        }
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn last_arg(invocation: &Invocation) -> String {
        invocation.args().last().map(|s| s.to_string()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_all_success_exits_zero() {
        let host = ScriptedHost::succeeding(10);
        let mut scheduler = Scheduler::new(&config(&["true"], Some(2)), host).unwrap();

        let report = scheduler.run(args(&["a", "b", "c"])).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.launched, 3);
        assert_eq!(report.completed, 3);
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_any_failure_is_nonzero() {
        let host = ScriptedHost::new(|inv| match last_arg(inv).as_str() {
            "bad" => ScriptedJob::exit(4, 10),
            "killed" => ScriptedJob::signaled(9, 10),
            _ => ScriptedJob::exit(0, 10),
        });
        let mut scheduler = Scheduler::new(&config(&["run"], Some(4)), host).unwrap();

        let report = scheduler
            .run(args(&["ok", "bad", "ok", "killed"]))
            .await
            .unwrap();
        assert_eq!(report.exit_code, 4 | SIGNALED);
        assert_eq!(report.completed, 4);
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_abort_siblings() {
        let host = ScriptedHost::new(|inv| match last_arg(inv).as_str() {
            "missing" => ScriptedJob::launch_failure(),
            _ => ScriptedJob::exit(0, 10),
        });
        let mut scheduler = Scheduler::new(&config(&["run"], Some(1)), host).unwrap();

        let report = scheduler
            .run(args(&["a", "missing", "b"]))
            .await
            .unwrap();
        assert_eq!(report.exit_code, LAUNCH_FAILED);
        assert_eq!(report.launched, 2);
        assert_eq!(report.launch_failures, 1);
        assert_eq!(report.completed, 2);
    }

    #[tokio::test]
    async fn test_batches_appended_in_order() {
        let host = ScriptedHost::succeeding(10);
        let cfg = SchedulerConfig {
            batch_size: 2,
            ..config(&["echo"], Some(1))
        };
        let mut scheduler = Scheduler::new(&cfg, host).unwrap();
        scheduler.run(args(&["a", "b", "c", "d", "e"])).await.unwrap();

        let launched = scheduler.host().launched();
        let batches: Vec<Vec<&str>> = launched.iter().map(|inv| inv.args()).collect();
        assert_eq!(batches, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[tokio::test]
    async fn test_placeholder_mode() {
        let host = ScriptedHost::succeeding(10);
        let cfg = SchedulerConfig {
            placeholder: true,
            ..config(&["echo", "{}", "!"], Some(1))
        };
        let mut scheduler = Scheduler::new(&cfg, host).unwrap();
        scheduler.run(args(&["x"])).await.unwrap();

        assert_eq!(
            scheduler.host().launched(),
            vec![&Invocation::Exec {
                argv: args(&["echo", "x", "!"])
            }]
        );
    }

    #[tokio::test]
    async fn test_command_line_mode_contributes_exit_code() {
        let host = ScriptedHost::new(|inv| match inv {
            Invocation::Shell { line, .. } if line == "echo hi && exit 3" => {
                ScriptedJob::exit(3, 10)
            }
            _ => ScriptedJob::exit(0, 10),
        });
        let mut scheduler = Scheduler::new(&config(&[], Some(2)), host).unwrap();

        let report = scheduler
            .run(args(&["echo hi && exit 3", "true"]))
            .await
            .unwrap();
        assert_eq!(report.exit_code, 3);
        assert_eq!(
            scheduler.host().launched()[0],
            &Invocation::Shell {
                shell: DEFAULT_SHELL.to_string(),
                line: "echo hi && exit 3".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_reaped_in_completion_order() {
        let host = ScriptedHost::new(|inv| match last_arg(inv).as_str() {
            "slow" => ScriptedJob::exit(0, 1000),
            _ => ScriptedJob::exit(0, 10),
        });
        let mut scheduler = Scheduler::new(&config(&["run"], Some(2)), host).unwrap();
        scheduler.run(args(&["slow", "fast"])).await.unwrap();

        let reaped: Vec<u32> = scheduler
            .host()
            .events()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Reaped(r) => Some(r.pid),
                _ => None,
            })
            .collect();
        // pids are assigned in launch order starting at 1000
        assert_eq!(reaped, vec![1001, 1000]);
    }

    #[tokio::test]
    async fn test_load_gating_waits_for_load_to_drop() {
        let host = ScriptedHost::succeeding(5000).with_loads([
            Some(0.5),
            Some(3.0),
            Some(3.0),
            Some(1.0),
        ]);
        let cfg = SchedulerConfig {
            max_load: Some(2.0),
            ..config(&["run"], None)
        };
        let mut scheduler = Scheduler::new(&cfg, host).unwrap();
        assert_eq!(scheduler.policy().concurrency_limit, 0);

        let report = scheduler.run(args(&["a", "b"])).await.unwrap();
        assert!(report.is_success());

        let events = scheduler.host().events();
        let second_launch = events
            .iter()
            .rposition(|e| matches!(e, HostEvent::Launched { .. }))
            .unwrap();
        // Two pauses while load sat at 3.0, then a sample under the ceiling.
        let pauses = events[..second_launch]
            .iter()
            .filter(|e| matches!(e, HostEvent::Paused))
            .count();
        assert_eq!(pauses, 2);
        assert_eq!(
            events[second_launch - 1],
            HostEvent::LoadSampled(Some(1.0))
        );
    }

    #[tokio::test]
    async fn test_load_gating_reaps_opportunistically() {
        // The first job finishes during the first pause and is collected by
        // the non-blocking reap, before load drops enough to admit more.
        let host = ScriptedHost::succeeding(500).with_loads([
            Some(0.0),
            Some(9.0),
            Some(9.0),
            Some(1.0),
        ]);
        let cfg = SchedulerConfig {
            max_load: Some(2.0),
            ..config(&["run"], None)
        };
        let mut scheduler = Scheduler::new(&cfg, host).unwrap();
        scheduler.run(args(&["a", "b"])).await.unwrap();

        let events = scheduler.host().events();
        let first_reap = events
            .iter()
            .position(|e| matches!(e, HostEvent::Reaped(_)))
            .unwrap();
        let second_launch = events
            .iter()
            .rposition(|e| matches!(e, HostEvent::Launched { .. }))
            .unwrap();
        assert!(first_reap < second_launch);
        assert!(matches!(
            events[second_launch],
            HostEvent::Launched { running: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_load_sample_fails_open() {
        let host = ScriptedHost::succeeding(10).with_loads([None]);
        let cfg = SchedulerConfig {
            max_load: Some(0.01),
            ..config(&["run"], None)
        };
        let mut scheduler = Scheduler::new(&cfg, host).unwrap();

        let report = scheduler.run(args(&["a", "b", "c"])).await.unwrap();
        assert_eq!(report.launched, 3);
        assert_eq!(report.peak_outstanding, 3);
        assert!(!scheduler
            .host()
            .events()
            .iter()
            .any(|e| matches!(e, HostEvent::Paused)));
    }

    #[tokio::test]
    async fn test_empty_stream_launches_nothing() {
        let host = ScriptedHost::succeeding(10);
        let mut scheduler = Scheduler::new(&config(&["true"], Some(2)), host).unwrap();
        let report = scheduler.run(Vec::new()).await.unwrap();
        assert_eq!(report, RunReport::default());
    }

    #[test]
    fn test_invalid_config_rejected_before_launch() {
        let cfg = SchedulerConfig {
            placeholder: true,
            batch_size: 2,
            ..config(&["echo", "{}"], None)
        };
        let host = ScriptedHost::succeeding(10);
        assert!(matches!(
            Scheduler::new(&cfg, host),
            Err(SchedError::PlaceholderWithBatch(2))
        ));
    }

    fn run_blocking(scheduler: &mut Scheduler<ScriptedHost>, items: Vec<String>) -> RunReport {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(scheduler.run(items))
            .unwrap()
    }

    proptest! {
        #[test]
        fn prop_outstanding_never_exceeds_limit(
            runtimes in proptest::collection::vec(0u64..50, 0..40),
            limit in 1usize..6,
            batch_size in 1usize..4,
        ) {
            let mut durations = runtimes.clone().into_iter();
            let host = ScriptedHost::new(move |_| ScriptedJob::exit(0, durations.next().unwrap_or(0)));
            let cfg = SchedulerConfig {
                batch_size,
                ..config(&["run"], Some(limit))
            };
            let mut scheduler = Scheduler::new(&cfg, host).unwrap();

            let items: Vec<String> = (0..runtimes.len()).map(|i| i.to_string()).collect();
            let report = run_blocking(&mut scheduler, items.clone());

            prop_assert!(scheduler.host().peak_running() <= limit);
            prop_assert!(report.peak_outstanding <= limit);
            prop_assert_eq!(report.launched, items.len().div_ceil(batch_size));
            prop_assert_eq!(report.completed, report.launched);

            let launched_args: Vec<String> = scheduler
                .host()
                .launched()
                .iter()
                .flat_map(|inv| inv.args().into_iter().map(str::to_string).collect::<Vec<_>>())
                .collect();
            prop_assert_eq!(launched_args, items);
        }

        #[test]
        fn prop_exit_code_zero_iff_all_succeed(codes in proptest::collection::vec(0i32..4, 1..20)) {
            let mut scripted = codes.clone().into_iter();
            let host = ScriptedHost::new(move |_| ScriptedJob::exit(scripted.next().unwrap_or(0), 5));
            let mut scheduler = Scheduler::new(&config(&["run"], Some(3)), host).unwrap();

            let items: Vec<String> = (0..codes.len()).map(|i| i.to_string()).collect();
            let report = run_blocking(&mut scheduler, items);

            let expected = codes.iter().fold(0, |acc, c| acc | c);
            prop_assert_eq!(report.exit_code, expected);
            prop_assert_eq!(report.is_success(), codes.iter().all(|c| *c == 0));
        }
    }
}
