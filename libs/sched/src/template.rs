//! Command templates and per-job invocations.
//!
//! A template is turned into one owned [`Invocation`] per batch:
//! - placeholder mode substitutes the batch's argument for every `{}`
//! - append mode adds the batch's arguments after the template tokens
//! - an empty template runs each argument as a command line via the shell

/// Marker replaced by the job's argument in placeholder mode.
pub const PLACEHOLDER: &str = "{}";

/// Shell used for command lines when none is configured.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// A concrete command ready to be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Execute `argv[0]` directly with the remaining tokens as arguments.
    Exec { argv: Vec<String> },

    /// Hand a full command line to `shell -c`.
    Shell { shell: String, line: String },
}

impl Invocation {
    /// Program that will be looked up and started.
    pub fn program(&self) -> &str {
        match self {
            Invocation::Exec { argv } => argv.first().map(String::as_str).unwrap_or(""),
            Invocation::Shell { shell, .. } => shell,
        }
    }

    /// Arguments passed after the program name.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Invocation::Exec { argv } => argv.iter().skip(1).map(String::as_str).collect(),
            Invocation::Shell { line, .. } => vec!["-c", line.as_str()],
        }
    }
}

/// How batch arguments are combined with the template tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    /// Append every batch argument after the template.
    Append,
    /// Replace [`PLACEHOLDER`] with the single batch argument.
    Placeholder,
    /// No template: each argument is a full command line.
    CommandLine,
}

/// The user's command, split into tokens.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    tokens: Vec<String>,
    mode: TemplateMode,
    shell: String,
}

impl CommandTemplate {
    /// Build a template. An empty token list selects command-line mode
    /// regardless of `placeholder`.
    pub fn new(tokens: Vec<String>, placeholder: bool, shell: impl Into<String>) -> Self {
        let mode = if tokens.is_empty() {
            TemplateMode::CommandLine
        } else if placeholder {
            TemplateMode::Placeholder
        } else {
            TemplateMode::Append
        };

        Self {
            tokens,
            mode,
            shell: shell.into(),
        }
    }

    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Produce the invocation for one batch.
    ///
    /// Placeholder mode substitutes the first argument of the batch and
    /// ignores the rest; configuration validation keeps such batches at one
    /// argument.
    pub fn build(&self, batch: &[String]) -> Invocation {
        match self.mode {
            TemplateMode::Append => {
                let mut argv = Vec::with_capacity(self.tokens.len() + batch.len());
                argv.extend(self.tokens.iter().cloned());
                argv.extend(batch.iter().cloned());
                Invocation::Exec { argv }
            }
            TemplateMode::Placeholder => {
                let argument = batch.first().map(String::as_str).unwrap_or("");
                let argv = self
                    .tokens
                    .iter()
                    .map(|token| substitute(token, argument))
                    .collect();
                Invocation::Exec { argv }
            }
            TemplateMode::CommandLine => Invocation::Shell {
                shell: self.shell.clone(),
                line: batch.join(" "),
            },
        }
    }
}

/// Replace every occurrence of the placeholder within a token.
fn substitute(token: &str, argument: &str) -> String {
    token.replace(PLACEHOLDER, argument)
}
