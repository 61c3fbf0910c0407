//! Scheduler configuration.

use std::num::NonZeroUsize;

use crate::admission::AdmissionPolicy;
use crate::error::SchedError;
use crate::template::{CommandTemplate, DEFAULT_SHELL};

/// Everything the scheduler needs besides the argument stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Command template tokens. Empty means every argument is a full
    /// command line run through `shell`.
    pub command: Vec<String>,

    /// Maximum concurrent jobs; `Some(0)` is unbounded by count.
    pub max_jobs: Option<usize>,

    /// Load average ceiling.
    pub max_load: Option<f64>,

    /// Arguments appended per job.
    pub batch_size: usize,

    /// Substitute `{}` instead of appending.
    pub placeholder: bool,

    /// Shell used in command-line mode.
    pub shell: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            max_jobs: None,
            max_load: None,
            batch_size: 1,
            placeholder: false,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Check option combinations and return the batch size.
    pub fn validate(&self) -> Result<NonZeroUsize, SchedError> {
        let batch_size = NonZeroUsize::new(self.batch_size).ok_or(SchedError::ZeroBatchSize)?;

        if let Some(load) = self.max_load {
            if !(load.is_finite() && load > 0.0) {
                return Err(SchedError::InvalidLoad(load));
            }
        }

        if self.command.is_empty() {
            if self.placeholder {
                return Err(SchedError::PlaceholderWithoutCommand);
            }
            if batch_size.get() > 1 {
                return Err(SchedError::CommandLineWithBatch(batch_size.get()));
            }
        }

        if self.placeholder && batch_size.get() > 1 {
            return Err(SchedError::PlaceholderWithBatch(batch_size.get()));
        }

        Ok(batch_size)
    }

    /// Resolve admission limits, defaulting to `cpus` concurrent jobs.
    pub fn admission_policy(&self, cpus: usize) -> AdmissionPolicy {
        AdmissionPolicy::resolve(self.max_jobs, self.max_load, cpus)
    }

    pub fn template(&self) -> CommandTemplate {
        CommandTemplate::new(self.command.clone(), self.placeholder, self.shell.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn with_command(command: &[&str]) -> SchedulerConfig {
        SchedulerConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = with_command(&["echo"]);
        assert_eq!(config.validate().unwrap().get(), 1);
        assert_eq!(config.shell, DEFAULT_SHELL);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = SchedulerConfig {
            batch_size: 0,
            ..with_command(&["echo"])
        };
        assert!(matches!(config.validate(), Err(SchedError::ZeroBatchSize)));
    }

    #[test]
    fn test_placeholder_with_batch_rejected() {
        let config = SchedulerConfig {
            batch_size: 2,
            placeholder: true,
            ..with_command(&["echo", "{}"])
        };
        assert!(matches!(
            config.validate(),
            Err(SchedError::PlaceholderWithBatch(2))
        ));
    }

    #[test]
    fn test_command_line_mode_rules() {
        let batched = SchedulerConfig {
            batch_size: 3,
            ..Default::default()
        };
        assert!(matches!(
            batched.validate(),
            Err(SchedError::CommandLineWithBatch(3))
        ));

        let placeholder = SchedulerConfig {
            placeholder: true,
            ..Default::default()
        };
        assert!(matches!(
            placeholder.validate(),
            Err(SchedError::PlaceholderWithoutCommand)
        ));

        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_invalid_load_rejected(#[case] load: f64) {
        let config = SchedulerConfig {
            max_load: Some(load),
            ..with_command(&["echo"])
        };
        assert!(matches!(config.validate(), Err(SchedError::InvalidLoad(_))));
    }

    #[test]
    fn test_admission_policy_defaults_to_cpus() {
        let config = with_command(&["echo"]);
        assert_eq!(config.admission_policy(6).concurrency_limit, 6);

        let load_only = SchedulerConfig {
            max_load: Some(2.0),
            ..with_command(&["echo"])
        };
        let policy = load_only.admission_policy(6);
        assert_eq!(policy.concurrency_limit, 0);
        assert_eq!(policy.load_ceiling, Some(2.0));
    }
}
