//! Error handling and display for the CLI.

use std::ffi::OsString;

use colored::Colorize;
use mu_sched::SchedError;
use thiserror::Error;

/// Exit status for usage errors and scheduler faults.
pub const FAILURE_EXIT: u8 = 1;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("missing `--` between the command and its arguments")]
    MissingSeparator,

    #[error("argument is not valid UTF-8: {0}")]
    NonUtf8Argument(String),

    #[error(transparent)]
    Clap(#[from] clap::Error),
}

impl CliError {
    pub fn from_non_utf8(arg: OsString) -> Self {
        Self::NonUtf8Argument(arg.to_string_lossy().into_owned())
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
        source = cause.source();
    }

    if matches!(err.downcast_ref::<CliError>(), Some(CliError::MissingSeparator)) {
        eprintln!(
            "\n{}",
            "Hint: separate the command from its arguments, e.g. `parallel gzip -- *.log`."
                .yellow()
        );
    }

    if let Some(sched_err) = err.downcast_ref::<SchedError>() {
        if sched_err.is_usage() {
            eprintln!("\n{}", "Hint: run `parallel --help` for usage.".yellow());
        }
    }
}
