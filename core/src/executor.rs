use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::command::{InputStream, OutputStream};
use crate::error::{AggregateError, ExecError, Termination};
use crate::pipe::is_broken_pipe;
use crate::stage_context::StageContext;

/// SIGPIPE has the same number on Linux, macOS and the BSDs.
const SIGPIPE: i32 = 13;

/// Looks the executable up on `PATH`; names containing a path separator are
/// taken relative to `working_dir`.
pub fn resolve_executable(name: &str, working_dir: &Path) -> Result<PathBuf, ExecError> {
    which::which_in(name, std::env::var_os("PATH"), working_dir)
        .map_err(|_| ExecError::ExecutableNotFound(name.to_string()))
}

pub fn termination(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::ExitCode(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return Termination::Signal(signal);
        }
    }

    Termination::Unknown
}

/// Runs an external program as one pipeline stage.
///
/// `input` is forwarded to the child's stdin when present; otherwise the
/// child inherits ours. The child's stdout goes to `output`, or to the
/// console when the stage is not redirected. stderr always goes to the
/// console. Returns once the child has exited and every forwarding task has
/// drained, reporting every failure seen along the way.
///
/// A child killed by SIGPIPE after its consumer stopped reading has
/// succeeded, as it would in a shell pipeline.
pub async fn run_external(
    name: &str,
    arguments: &[String],
    command_line: &str,
    input: Option<InputStream>,
    output: Option<OutputStream>,
    ctx: &StageContext,
) -> anyhow::Result<()> {
    let program = resolve_executable(name, ctx.working_dir())?;

    let mut child = Command::new(&program)
        .args(arguments)
        .current_dir(ctx.working_dir())
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::SpawnFailed {
            command_line: command_line.to_string(),
            source,
        })?;

    let stdin_task = match (input, child.stdin.take()) {
        (Some(input), Some(stdin)) => Some(spawn_forward(input, stdin)),
        _ => None,
    };

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let output: OutputStream = match output {
        Some(stream) => stream,
        None => Box::new(ctx.console().stdout()),
    };
    let stdout_task = spawn_forward(stdout, output);

    let stderr = child.stderr.take().context("Failed to capture stderr")?;
    let stderr_task = spawn_forward(stderr, ctx.console().stderr());

    let mut errors = Vec::new();

    let status = match child.wait().await {
        Ok(status) => Some(status),
        Err(err) => {
            let _ = child.start_kill();
            errors.push(anyhow::Error::new(err).context("Failed to wait for child process"));
            None
        }
    };

    if let Some(task) = stdin_task {
        if let Err(err) = finish_forward(task, "feed standard input", command_line).await {
            errors.push(err);
        }
    }
    let consumer_gone = match finish_forward(stdout_task, "forward standard output", command_line).await {
        Ok(forwarded) => forwarded == Forwarded::ConsumerGone,
        Err(err) => {
            errors.push(err);
            false
        }
    };
    if let Err(err) = finish_forward(stderr_task, "forward standard error", command_line).await {
        errors.push(err);
    }

    if let Some(status) = status {
        let termination = termination(status);
        let closed_by_consumer = consumer_gone && termination == Termination::Signal(SIGPIPE);
        if !status.success() && !closed_by_consumer {
            errors.push(
                ExecError::AbnormalExit {
                    termination,
                    command_line: command_line.to_string(),
                }
                .into(),
            );
        }
    }

    AggregateError::collect(errors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    Drained,
    /// The consumer stopped reading; the producer's end has been dropped.
    ConsumerGone,
}

/// Copies `reader` into `writer` until end of stream, then closes `writer`.
/// Copying stops early once the consumer stops reading.
fn spawn_forward<R, W>(mut reader: R, mut writer: W) -> JoinHandle<io::Result<Forwarded>>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        match tokio::io::copy(&mut reader, &mut writer).await {
            Ok(_) => {}
            Err(err) if is_broken_pipe(&err) => return Ok(Forwarded::ConsumerGone),
            Err(err) => return Err(err),
        }
        match writer.shutdown().await {
            Err(err) if !is_broken_pipe(&err) => Err(err),
            _ => Ok(Forwarded::Drained),
        }
    })
}

async fn finish_forward(
    task: JoinHandle<io::Result<Forwarded>>,
    action: &str,
    command_line: &str,
) -> anyhow::Result<Forwarded> {
    task.await
        .with_context(|| format!("Task to {} panicked", action))?
        .with_context(|| format!("Failed to {} of \"{}\"", action, command_line))
}
