//! parallel - run a command for each argument, several at a time.
//!
//! ```text
//! parallel [OPTIONS] [COMMAND]... -- [ARGUMENTS]...
//! ```
//!
//! Exits with the bitwise OR of every job's exit status.

use std::process::ExitCode;

use anyhow::Result;
use mu_sched::{RunReport, Scheduler, SystemHost};
use tracing::debug;

mod cli;
mod error;
mod logging;

use cli::Invocation;
use error::{CliError, FAILURE_EXIT};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let Invocation { cli, arguments } = match cli::parse(std::env::args_os().collect()) {
        Ok(invocation) => invocation,
        Err(CliError::Clap(e)) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(FAILURE_EXIT)
            } else {
                ExitCode::SUCCESS
            };
        }
        Err(e) => {
            error::print_error(&anyhow::Error::from(e));
            return ExitCode::from(FAILURE_EXIT);
        }
    };

    if let Err(e) = logging::init(cli.log_level.as_deref(), cli.log_format) {
        error::print_error(&e);
        return ExitCode::from(FAILURE_EXIT);
    }

    match run(&cli, arguments).await {
        Ok(report) => {
            debug!(exit_code = report.exit_code, "parallel exiting");
            ExitCode::from(u8::try_from(report.exit_code).unwrap_or(FAILURE_EXIT))
        }
        Err(e) => {
            debug!(error = %e, "parallel failed");
            error::print_error(&e);
            ExitCode::from(FAILURE_EXIT)
        }
    }
}

async fn run(cli: &cli::Cli, arguments: Vec<String>) -> Result<RunReport> {
    let config = cli.scheduler_config();
    let mut scheduler = Scheduler::new(&config, SystemHost::new())?;
    let report = scheduler.run(arguments).await?;
    Ok(report)
}
