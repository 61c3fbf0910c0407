//! Error types for the scheduler.

use thiserror::Error;

/// Scheduler errors with standardized reason codes.
///
/// Usage variants are raised before any job starts. A single job failing to
/// launch is not an error at this level; see [`LaunchError`].
#[derive(Debug, Error)]
pub enum SchedError {
    /// Batch size must be at least one argument per job.
    #[error("invalid_batch_size: batch size must be positive")]
    ZeroBatchSize,

    /// Placeholder substitution takes exactly one argument per job.
    #[error("placeholder_with_batch: placeholder mode cannot be combined with batch size {0}")]
    PlaceholderWithBatch(usize),

    /// Full-command-line mode runs one line per job.
    #[error("command_line_with_batch: without a command, batch size must be 1 (got {0})")]
    CommandLineWithBatch(usize),

    /// Placeholder mode needs a template to substitute into.
    #[error("placeholder_without_command: placeholder mode requires a command")]
    PlaceholderWithoutCommand,

    /// Load ceiling must be a positive, finite number.
    #[error("invalid_load: load ceiling must be a positive number, got {0}")]
    InvalidLoad(f64),

    /// Waiting for a child failed.
    #[error("reap_failed: {0}")]
    Reap(#[from] nix::Error),

    /// The OS reported no children while jobs were still outstanding.
    #[error("lost_children: no children to reap with {outstanding} job(s) outstanding")]
    LostChildren { outstanding: usize },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SchedError::ZeroBatchSize => "invalid_batch_size",
            SchedError::PlaceholderWithBatch(_) => "placeholder_with_batch",
            SchedError::CommandLineWithBatch(_) => "command_line_with_batch",
            SchedError::PlaceholderWithoutCommand => "placeholder_without_command",
            SchedError::InvalidLoad(_) => "invalid_load",
            SchedError::Reap(_) => "reap_failed",
            SchedError::LostChildren { .. } => "lost_children",
            SchedError::Io(_) => "io_error",
        }
    }

    /// Returns true if this error was caused by an invalid configuration.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            SchedError::ZeroBatchSize
                | SchedError::PlaceholderWithBatch(_)
                | SchedError::CommandLineWithBatch(_)
                | SchedError::PlaceholderWithoutCommand
                | SchedError::InvalidLoad(_)
        )
    }
}

/// A single job could not be started.
#[derive(Debug, Error)]
#[error("failed to launch {program}: {source}")]
pub struct LaunchError {
    /// Program (or shell) that was being started.
    pub program: String,

    #[source]
    pub source: std::io::Error,
}

impl LaunchError {
    pub fn new(program: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            program: program.into(),
            source,
        }
    }
}
