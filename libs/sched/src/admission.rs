//! Admission control: may another job start right now?

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Start the next batch.
    Admit,
    /// The concurrency limit is reached; a job must finish first.
    BlockedOnCount,
    /// The sampled load is at or above the ceiling.
    BlockedOnLoad { load: f64 },
}

/// Limits applied before every launch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionPolicy {
    /// Maximum outstanding jobs; 0 means unbounded by count.
    pub concurrency_limit: usize,

    /// 1-minute load average ceiling; `None` disables load gating.
    pub load_ceiling: Option<f64>,
}

impl AdmissionPolicy {
    /// Resolve the caller's knobs into a policy.
    ///
    /// When neither a job limit nor a load ceiling was given, the limit
    /// defaults to `cpus`. This happens once, before the loop starts.
    pub fn resolve(max_jobs: Option<usize>, max_load: Option<f64>, cpus: usize) -> Self {
        let concurrency_limit = match (max_jobs, max_load) {
            (Some(jobs), _) => jobs,
            (None, Some(_)) => 0,
            (None, None) => cpus.max(1),
        };

        Self {
            concurrency_limit,
            load_ceiling: max_load,
        }
    }

    /// Decide whether a job may start given `outstanding` running jobs.
    ///
    /// `sample_load` is only consulted when the count check passes and a
    /// ceiling is set. A failed sample counts as below the ceiling.
    pub fn check<F>(&self, outstanding: usize, sample_load: F) -> Admission
    where
        F: FnOnce() -> Option<f64>,
    {
        if self.concurrency_limit > 0 && outstanding >= self.concurrency_limit {
            return Admission::BlockedOnCount;
        }

        if let Some(ceiling) = self.load_ceiling {
            if let Some(load) = sample_load() {
                if load >= ceiling {
                    return Admission::BlockedOnLoad { load };
                }
            }
        }

        Admission::Admit
    }
}
