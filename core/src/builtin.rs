//! Commands implemented in-process.

use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pipe::is_broken_pipe;

const COPY_BUFFER_SIZE: usize = 8192;

/// Copies each named file to `output` in order, or `input` when no files are
/// named.
pub async fn cat<R, W>(
    arguments: &[String],
    working_dir: &Path,
    input: Option<&mut R>,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    if arguments.is_empty() {
        if let Some(input) = input {
            copy_stream(input, output)
                .await
                .context("Failed to copy standard input")?;
        }
        return Ok(());
    }

    for argument in arguments {
        let path = crate::path::resolve(working_dir, argument)?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        copy_stream(&mut file, output)
            .await
            .with_context(|| format!("Failed to copy file: {}", path.display()))?;
    }

    Ok(())
}

/// Writes the arguments joined by single spaces, then a newline.
pub async fn echo<W>(arguments: &[String], output: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let line = format!("{}\n", arguments.join(" "));
    match output.write_all(line.as_bytes()).await {
        Err(err) if !is_broken_pipe(&err) => Err(err).context("Failed to write output"),
        _ => Ok(()),
    }
}

/// Copies until end of input, or until the consumer stops reading.
pub async fn copy_stream<R, W>(input: &mut R, output: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let length = input.read(&mut buffer).await?;
        if length == 0 {
            break;
        }
        match output.write_all(&buffer[..length]).await {
            Err(err) if is_broken_pipe(&err) => break,
            written => written?,
        }
        total += length as u64;
    }
    Ok(total)
}
