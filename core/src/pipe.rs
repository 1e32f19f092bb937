//! In-process byte pipe connecting the output of one pipeline stage to the
//! input of the next.
//!
//! Each pipe has exactly one [`PipeWriter`] and one [`PipeReader`]; neither is
//! `Clone`, so ownership alone keeps a pipe single-producer/single-consumer.
//! Dropping or shutting down the writer ends the stream: the reader drains
//! whatever is buffered and then observes EOF (a zero-length read).
//!
//! When the reader is gone, writes fail with `BrokenPipe` so the producer
//! can stop. Closing the writer after that point still succeeds.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

const CAPACITY: usize = 64 * 1024;

pub fn channel() -> (PipeWriter, PipeReader) {
    with_capacity(CAPACITY)
}

pub fn with_capacity(capacity: usize) -> (PipeWriter, PipeReader) {
    let (write_half, read_half) = tokio::io::duplex(capacity.max(1));
    (PipeWriter { inner: write_half }, PipeReader { inner: read_half })
}

#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
}

#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
}

/// True when a write failed only because the consumer stopped reading.
pub fn is_broken_pipe(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::new(&mut self.inner).poll_shutdown(cx) {
            Poll::Ready(Err(err)) if is_broken_pipe(&err) => Poll::Ready(Ok(())),
            other => other,
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
