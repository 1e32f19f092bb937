use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Header marker (e.g. \"# !bmake\") not found: path=\"{}\"", .0.display())]
    HeaderNotFound(PathBuf),

    #[error("Syntax error: the dependency definition contains multiple lines beginning with ':'")]
    MultipleSeparators,

    #[error("No target specified: path=\"{}\"", .0.display())]
    NoTargets(PathBuf),

    #[error("An invalid variable is specified: \"{0}\"")]
    InvalidVariable(String),

    #[error("Failed to create the temporary resource for \"{placeholder}\"")]
    TempAllocation {
        placeholder: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path name: \"{0}\"")]
    InvalidPath(String),

    #[error("Duplicate redirection from standard input")]
    DuplicateStdinRedirect,

    #[error("Duplicate redirection to standard output")]
    DuplicateStdoutRedirect,

    #[error("Pipe and redirection conflict")]
    PipeRedirectConflict,

    #[error("No redirection source for standard input is specified")]
    MissingRedirectSource,

    #[error("No redirection destination for standard output is specified")]
    MissingRedirectDestination,

    #[error("The command is specified after the redirect specification: \"{0}\"")]
    CommandAfterRedirect(String),

    #[error("No command precedes the redirection")]
    NoCommandBeforeRedirect,

    #[error("The command to which the pipe is connected is not specified")]
    MissingPipeTarget,

    #[error("Malformed command line: \"{0}\"")]
    MalformedCommandLine(String),
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Executable file not found: \"{0}\"")]
    ExecutableNotFound(String),

    #[error("Failed to start process: command-line=\"{command_line}\"")]
    SpawnFailed {
        command_line: String,
        #[source]
        source: std::io::Error,
    },

    #[error("The process terminated abnormally: {termination}, command-line=\"{command_line}\"")]
    AbnormalExit {
        termination: Termination,
        command_line: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ExitCode(i32),
    Signal(i32),
    Unknown,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::ExitCode(code) => write!(f, "exit-code={}", code),
            Termination::Signal(signal) => write!(f, "signal={}", signal),
            Termination::Unknown => write!(f, "exit-code=unknown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("The source file does not exist: \"{}\"", .0.display())]
    MissingSource(PathBuf),
}

/// Failures of several stages of one pipeline chain, surfaced together.
#[derive(Debug)]
pub struct AggregateError(pub Vec<anyhow::Error>);

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} commands of the pipeline failed", self.0.len())
    }
}

impl std::error::Error for AggregateError {}

impl AggregateError {
    /// No errors is success, a single error is returned as is, and several
    /// are wrapped together.
    pub fn collect(mut errors: Vec<anyhow::Error>) -> anyhow::Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(AggregateError(errors).into()),
        }
    }
}

/// Flattens an error into the lines shown to the user: one per error in the
/// chain, recursing into every member of an aggregate.
pub fn report_lines(err: &anyhow::Error) -> Vec<String> {
    let mut lines = Vec::new();
    collect_lines(err, &mut lines);
    lines
}

fn collect_lines(err: &anyhow::Error, lines: &mut Vec<String>) {
    for cause in err.chain() {
        lines.push(cause.to_string());
        if let Some(aggregate) = cause.downcast_ref::<AggregateError>() {
            for nested in &aggregate.0 {
                collect_lines(nested, lines);
            }
        }
    }
}
