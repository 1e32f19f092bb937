use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::builtin;
use crate::error::ScriptError;
use crate::executor;
use crate::pipe::{PipeReader, PipeWriter};
use crate::stage_context::StageContext;

pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;
pub type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Cat,
    Echo,
    External,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "cat" => CommandKind::Cat,
            "echo" => CommandKind::Echo,
            _ => CommandKind::External,
        }
    }
}

#[derive(Debug)]
pub enum StageInput {
    /// The build driver's own standard input.
    Inherit,
    File(PathBuf),
    Pipe(PipeReader),
}

#[derive(Debug)]
pub enum StageOutput {
    /// The console's standard output.
    Inherit,
    File { path: PathBuf, append: bool },
    Pipe(PipeWriter),
}

impl StageInput {
    pub async fn open(self) -> anyhow::Result<Option<InputStream>> {
        match self {
            StageInput::Inherit => Ok(None),
            StageInput::File(path) => {
                let file = tokio::fs::File::open(&path).await.with_context(|| {
                    format!("Failed to open file for reading: {}", path.display())
                })?;
                Ok(Some(Box::new(file)))
            }
            StageInput::Pipe(reader) => Ok(Some(Box::new(reader))),
        }
    }
}

impl StageOutput {
    pub async fn open(self) -> anyhow::Result<Option<OutputStream>> {
        match self {
            StageOutput::Inherit => Ok(None),
            StageOutput::File { path, append } => {
                let file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(append)
                    .truncate(!append)
                    .open(&path)
                    .await
                    .with_context(|| {
                        format!("Failed to open file for writing: {}", path.display())
                    })?;
                Ok(Some(Box::new(file)))
            }
            StageOutput::Pipe(writer) => Ok(Some(Box::new(writer))),
        }
    }
}

/// One stage of a pipeline chain: a command line plus where its standard
/// input comes from and where its standard output goes.
#[derive(Debug)]
pub struct CommandSpec {
    command_line: String,
    name: String,
    arguments: Vec<String>,
    kind: CommandKind,
    input: StageInput,
    output: StageOutput,
}

impl CommandSpec {
    pub fn parse(
        command_line: String,
        input: StageInput,
        output: StageOutput,
    ) -> Result<Self, ScriptError> {
        let mut words = shlex::split(&command_line)
            .ok_or_else(|| ScriptError::MalformedCommandLine(command_line.clone()))?
            .into_iter();
        let name = words
            .next()
            .ok_or_else(|| ScriptError::MalformedCommandLine(command_line.clone()))?;

        Ok(Self {
            kind: CommandKind::from_name(&name),
            arguments: words.collect(),
            name,
            command_line,
            input,
            output,
        })
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_piped_from_previous(&self) -> bool {
        matches!(self.input, StageInput::Pipe(_))
    }

    pub fn is_piped_to_next(&self) -> bool {
        matches!(self.output, StageOutput::Pipe(_))
    }

    pub fn redirected_input(&self) -> Option<&Path> {
        match &self.input {
            StageInput::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn redirected_output(&self) -> Option<(&Path, bool)> {
        match &self.output {
            StageOutput::File { path, append } => Some((path, *append)),
            _ => None,
        }
    }

    /// Runs the stage to completion. For external commands this includes the
    /// child's exit and the draining of all of its streams.
    pub async fn run(self, ctx: StageContext) -> anyhow::Result<()> {
        let Self {
            command_line,
            name,
            arguments,
            kind,
            input,
            output,
        } = self;

        match kind {
            CommandKind::External => {
                let input = input.open().await?;
                let output = output.open().await?;
                executor::run_external(&name, &arguments, &command_line, input, output, &ctx).await
            }
            CommandKind::Cat | CommandKind::Echo => {
                let mut output: OutputStream = match output.open().await? {
                    Some(stream) => stream,
                    None => Box::new(ctx.console().stdout()),
                };

                let result = if kind == CommandKind::Cat {
                    let mut input: InputStream = match input.open().await? {
                        Some(stream) => stream,
                        None => Box::new(tokio::io::stdin()),
                    };
                    builtin::cat(&arguments, ctx.working_dir(), Some(&mut input), &mut output)
                        .await
                } else {
                    drop(input);
                    builtin::echo(&arguments, &mut output).await
                };
                result.with_context(|| {
                    format!("Command failed: command-line=\"{}\"", command_line)
                })?;

                output
                    .shutdown()
                    .await
                    .with_context(|| format!("Failed to close output of \"{}\"", command_line))
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_piped_from_previous() {
            write!(f, "| ")?;
        }
        write!(f, "{}", self.command_line)?;
        if let Some(path) = self.redirected_input() {
            write!(f, " < {}", path.display())?;
        }
        if let Some((path, append)) = self.redirected_output() {
            write!(f, " {} {}", if append { ">>" } else { ">" }, path.display())?;
        }
        Ok(())
    }
}
