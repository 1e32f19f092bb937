use std::fs::File;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

fn shared(sink: Box<dyn Write + Send>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "console sink lock poisoned")
}

/// The standard output and standard error streams of one build run.
///
/// Handed explicitly to every component that prints, so that mirroring into a
/// log file (or capturing in tests) never requires swapping process globals.
#[derive(Clone)]
pub struct Console {
    out: SharedSink,
    err: SharedSink,
    colored: bool,
}

impl Console {
    pub fn stdio() -> Self {
        Self {
            out: shared(Box::new(io::stdout())),
            err: shared(Box::new(io::stderr())),
            colored: atty::is(atty::Stream::Stderr),
        }
    }

    /// Standard streams, each also copied into `log`.
    pub fn mirrored(log: File) -> Self {
        let log = Arc::new(Mutex::new(log));
        Self {
            out: shared(Box::new(Mirror {
                primary: Box::new(io::stdout()),
                log: Arc::clone(&log),
            })),
            err: shared(Box::new(Mirror {
                primary: Box::new(io::stderr()),
                log,
            })),
            colored: false,
        }
    }

    pub fn from_writers(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: shared(out),
            err: shared(err),
            colored: false,
        }
    }

    pub fn is_colored(&self) -> bool {
        self.colored
    }

    pub fn stdout(&self) -> ConsoleWriter {
        ConsoleWriter {
            sink: Arc::clone(&self.out),
        }
    }

    pub fn stderr(&self) -> ConsoleWriter {
        ConsoleWriter {
            sink: Arc::clone(&self.err),
        }
    }

    pub fn write_err_line(&self, line: &str) -> io::Result<()> {
        let mut sink = self.err.lock().map_err(|_| poisoned())?;
        writeln!(sink, "{}", line)?;
        sink.flush()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().map_err(|_| poisoned())?.flush()?;
        self.err.lock().map_err(|_| poisoned())?.flush()
    }
}

struct Mirror {
    primary: Box<dyn Write + Send>,
    log: Arc<Mutex<File>>,
}

impl Write for Mirror {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.primary.write(buf)?;
        self.log
            .lock()
            .map_err(|_| poisoned())?
            .write_all(&buf[..written])?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.log.lock().map_err(|_| poisoned())?.flush()
    }
}

/// Async adapter over one console sink. Writes complete immediately; the
/// console is a terminal or a file, never a slow consumer worth yielding for.
pub struct ConsoleWriter {
    sink: SharedSink,
}

impl AsyncWrite for ConsoleWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = match self.sink.lock() {
            Ok(mut sink) => sink.write(buf),
            Err(_) => Err(poisoned()),
        };
        Poll::Ready(result)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = match self.sink.lock() {
            Ok(mut sink) => sink.flush(),
            Err(_) => Err(poisoned()),
        };
        Poll::Ready(result)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

/// In-memory sink shared between a `Console` and the code inspecting it.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
