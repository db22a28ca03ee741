//! Sink planning and destination writers
//!
//! A sink is an (encoding, destination, level) triple. `plan_sinks` turns a
//! configuration into the list of sinks to build; `SinkWriter` is the
//! mutex-guarded destination each sink writes through.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

use crate::config::LogConfig;
use crate::level::Severity;

/// How a sink turns records into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One JSON object per line
    Json,
    /// Tab-separated human-oriented line
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub encoding: Encoding,
    pub destination: Destination,
    pub level: Severity,
}

/// Decide which sinks a configuration asks for.
///
/// Never returns an empty list: without file or console output a JSON sink
/// on standard error is added. A file sink with no path keeps an empty path
/// so opening it fails.
pub fn plan_sinks(config: &LogConfig, level: Severity) -> Vec<SinkSpec> {
    let mut sinks = Vec::new();

    if config.log_to_file {
        sinks.push(SinkSpec {
            encoding: Encoding::Json,
            destination: Destination::File(config.log_file_path.clone().unwrap_or_default()),
            level,
        });
    }

    if config.log_to_console {
        let encoding = if config.dev_mode {
            Encoding::Console
        } else {
            Encoding::Json
        };
        sinks.push(SinkSpec {
            encoding,
            destination: Destination::Stdout,
            level,
        });
    }

    if sinks.is_empty() {
        sinks.push(SinkSpec {
            encoding: Encoding::Json,
            destination: Destination::Stderr,
            level,
        });
    }

    sinks
}

type BoxedWrite = Box<dyn Write + Send>;

/// Shared, mutex-guarded destination.
///
/// Clones write to the same destination. Once closed, writes are accepted
/// and discarded.
#[derive(Clone)]
pub struct SinkWriter {
    inner: Arc<Mutex<Option<BoxedWrite>>>,
}

impl SinkWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        SinkWriter {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Open `path` for appending, creating it if needed
    pub fn open_append(path: &Path) -> io::Result<Self> {
        let file = append_options().open(path)?;
        Ok(Self::new(LineWriter::new(file)))
    }

    fn lock(&self) -> MutexGuard<'_, Option<BoxedWrite>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn flush(&self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Drop the underlying writer, closing any file it holds
    pub fn close(&self) {
        self.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

fn append_options() -> OpenOptions {
    let mut options = File::options();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options
}

/// Writer handed out per record; holds the destination lock until dropped
pub struct SinkGuard<'a> {
    guard: MutexGuard<'a, Option<BoxedWrite>>,
}

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.guard.as_mut() {
            Some(writer) => writer.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.guard.as_mut() {
            Some(writer) => writer.write_all(buf),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.guard.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkGuard { guard: self.lock() }
    }
}
