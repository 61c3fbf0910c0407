//! Command-line parsing.
//!
//! The literal `--` separates options and the command template from the
//! argument stream. It is located before clap sees anything, so the stream
//! may contain anything at all. Option parsing stops at the first template
//! token; later template tokens may start with `-`.

use std::ffi::OsString;

use clap::{CommandFactory, Parser};
use mu_sched::template::DEFAULT_SHELL;
use mu_sched::SchedulerConfig;

use crate::error::CliError;
use crate::logging::LogFormat;

/// Separator between the command template and the argument stream.
pub const SEPARATOR: &str = "--";

/// parallel - run a command for each argument, several at a time.
///
/// Each argument after `--` is passed to one instance of COMMAND. With no
/// COMMAND, each argument is itself a command line run through the shell.
/// The exit status is the bitwise OR of every job's exit status.
#[derive(Debug, Parser)]
#[command(name = "parallel")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "parallel [OPTIONS] [COMMAND]... -- [ARGUMENTS]...")]
pub struct Cli {
    /// Maximum number of jobs to run at once (0 = no limit).
    ///
    /// Defaults to the number of CPUs unless a load ceiling is given.
    #[arg(short = 'j', long = "jobs", env = "PARALLEL_JOBS", value_name = "N")]
    pub jobs: Option<usize>,

    /// Do not start new jobs while the 1-minute load average is at or above LOAD.
    #[arg(
        short = 'l',
        long = "load",
        env = "PARALLEL_LOAD",
        value_name = "LOAD",
        value_parser = parse_load
    )]
    pub load: Option<f64>,

    /// Number of arguments to pass to each job.
    #[arg(short = 'n', long = "batch", value_name = "N", default_value_t = 1)]
    pub batch: usize,

    /// Replace `{}` in COMMAND with the argument instead of appending it.
    #[arg(short = 'i', long = "replace")]
    pub replace: bool,

    /// Shell used when no COMMAND is given [default: $SHELL or /bin/sh].
    #[arg(long, env = "PARALLEL_SHELL", value_name = "PATH")]
    pub shell: Option<String>,

    /// Log filter directives (overrides PARALLEL_LOG).
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Command template.
    #[arg(
        trailing_var_arg = true,
        num_args = 1..,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

fn parse_load(value: &str) -> Result<f64, String> {
    let load: f64 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if !(load.is_finite() && load > 0.0) {
        return Err(format!("load ceiling must be positive, got {}", value));
    }
    Ok(load)
}

impl Cli {
    /// Scheduler settings derived from the parsed options.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            command: self.command.clone(),
            max_jobs: self.jobs,
            max_load: self.load,
            batch_size: self.batch,
            placeholder: self.replace,
            shell: self.resolve_shell(),
        }
    }

    fn resolve_shell(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .filter(|shell| !shell.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string())
    }
}

/// Parsed command line: options, template and argument stream.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    pub arguments: Vec<String>,
}

/// Parse raw process arguments, program name included.
pub fn parse(raw: Vec<OsString>) -> Result<Invocation, CliError> {
    let (head, tail) = split_at_separator(raw)?;
    let cli = Cli::try_parse_from(head)?;

    let arguments = tail
        .into_iter()
        .map(|arg| arg.into_string().map_err(CliError::from_non_utf8))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Invocation { cli, arguments })
}

/// Split argv at the first `--` after the program name.
fn split_at_separator(
    mut raw: Vec<OsString>,
) -> Result<(Vec<OsString>, Vec<OsString>), CliError> {
    let separator = raw
        .iter()
        .skip(1)
        .position(|arg| arg == SEPARATOR)
        .map(|idx| idx + 1);

    match separator {
        Some(idx) => {
            let tail = raw.split_off(idx + 1);
            raw.truncate(idx);
            Ok((raw, tail))
        }
        None if wants_help_or_version(&raw) => Ok((raw, Vec::new())),
        None => Err(CliError::MissingSeparator),
    }
}

/// `--help` and `--version` work without a separator, but only among the
/// options. From the first template token on they belong to COMMAND.
fn wants_help_or_version(raw: &[OsString]) -> bool {
    let command = Cli::command();
    let mut tokens = raw.iter().skip(1).map(|arg| arg.to_str());

    while let Some(token) = tokens.next() {
        match token {
            Some("-h" | "--help" | "-V" | "--version") => return true,
            Some(option) if takes_separate_value(&command, option) => {
                tokens.next();
            }
            Some(option) if option.starts_with('-') => {}
            _ => return false,
        }
    }

    false
}

/// Whether `option` is a bare `-x` or `--name` whose value is the next token.
fn takes_separate_value(command: &clap::Command, option: &str) -> bool {
    command
        .get_arguments()
        .filter(|arg| !arg.is_positional() && arg.get_action().takes_values())
        .any(|arg| match option.strip_prefix("--") {
            Some(long) => arg.get_long() == Some(long),
            None => {
                let mut chars = option.chars();
                chars.next() == Some('-')
                    && chars.next().is_some_and(|c| arg.get_short() == Some(c))
                    && chars.next().is_none()
            }
        })
}
