//! Logger construction
//!
//! `LoggerFactory::build` validates the level, opens the configured sinks and
//! puts them behind one fan-out layer in a `tracing` dispatcher. Nothing is
//! installed as the global subscriber: the returned `Logger` carries its own
//! `Dispatch`, and the paired `Cleanup` flushes and closes what was opened.

use std::fmt;
use std::io::{self, IsTerminal};
use std::panic::Location;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::Dispatch;
use tracing::dispatcher::{self, DefaultGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

use crate::config::LogConfig;
use crate::encoder::short_caller;
use crate::error::LoggingError;
use crate::fanout::{FanoutLayer, Sink};
use crate::level::Severity;
use crate::metrics::Metrics;
use crate::sink::{Destination, SinkWriter, plan_sinks};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Build a logger writing to the process's standard streams
pub fn new_logger(config: &LogConfig) -> Result<(Logger, Cleanup), LoggingError> {
    LoggerFactory::new().build(config)
}

/// Builds `Logger`/`Cleanup` pairs from configuration
pub struct LoggerFactory {
    stdout: SinkWriter,
    stdout_ansi: bool,
    stderr: SinkWriter,
    metrics: Option<Metrics>,
}

impl Default for LoggerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerFactory {
    pub fn new() -> Self {
        Self {
            stdout: SinkWriter::stdout(),
            stdout_ansi: io::stdout().is_terminal(),
            stderr: SinkWriter::stderr(),
            metrics: None,
        }
    }

    /// Replace standard output as the console destination
    pub fn with_stdout(self, stdout: SinkWriter) -> Self {
        Self {
            stdout,
            stdout_ansi: false,
            ..self
        }
    }

    /// Replace standard error as the fallback destination
    pub fn with_stderr(self, stderr: SinkWriter) -> Self {
        Self { stderr, ..self }
    }

    /// Count accepted records into `metrics`
    pub fn with_metrics(self, metrics: Metrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    pub fn build(&self, config: &LogConfig) -> Result<(Logger, Cleanup), LoggingError> {
        let level: Severity = config.log_level.parse()?;
        let specs = plan_sinks(config, level);

        let mut cleanup = Cleanup::default();
        let mut sinks = Vec::with_capacity(specs.len());

        for spec in &specs {
            let (writer, ansi) = match &spec.destination {
                Destination::File(path) => {
                    let writer =
                        SinkWriter::open_append(path).map_err(|source| LoggingError::Io {
                            path: path.clone(),
                            source,
                        })?;
                    cleanup.files.push(writer.clone());
                    (writer, false)
                }
                Destination::Stdout => (self.stdout.clone(), self.stdout_ansi),
                Destination::Stderr => (self.stderr.clone(), false),
            };
            cleanup.writers.push(writer.clone());
            sinks.push(Sink {
                encoding: spec.encoding,
                ansi,
                filter: spec.level.filter(),
                writer,
            });
        }

        let mut layers: Vec<BoxedLayer> = vec![FanoutLayer::new(sinks).boxed()];
        if let Some(metrics) = &self.metrics {
            metrics.sinks.set(specs.len() as i64);
            layers.push(metrics.layer().with_filter(level.filter()).boxed());
        }

        let dispatch = Dispatch::new(Registry::default().with(layers));
        let logger = Logger {
            dispatch,
            name: Arc::from(config.name.as_str()),
        };

        Ok((logger, cleanup))
    }
}

/// Handle for emitting records to the sinks it was built with.
///
/// Cheap to clone and safe to share across threads. Besides the emission
/// methods, any `tracing` macro called inside [`Logger::in_scope`] (or while
/// the guard from [`Logger::set_default`] is alive) goes to this logger.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    name: Arc<str>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger as the current thread's subscriber
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this logger the current thread's subscriber until the guard drops
    pub fn set_default(&self) -> DefaultGuard {
        dispatcher::set_default(&self.dispatch)
    }

    #[track_caller]
    pub fn debug(&self, msg: &str, attrs: &[(&str, Value)]) {
        self.emit(Severity::Debug, msg, attrs, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, msg: &str, attrs: &[(&str, Value)]) {
        self.emit(Severity::Info, msg, attrs, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, msg: &str, attrs: &[(&str, Value)]) {
        self.emit(Severity::Warn, msg, attrs, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, msg: &str, attrs: &[(&str, Value)]) {
        self.emit(Severity::Error, msg, attrs, Location::caller());
    }

    #[track_caller]
    pub fn log(&self, severity: Severity, msg: &str, attrs: &[(&str, Value)]) {
        self.emit(severity, msg, attrs, Location::caller());
    }

    fn emit(
        &self,
        severity: Severity,
        msg: &str,
        attrs: &[(&str, Value)],
        location: &Location<'_>,
    ) {
        let name: &str = &self.name;
        let caller = short_caller(location.file(), location.line());
        let caller = caller.as_str();
        let attrs = Attrs(attrs);

        self.in_scope(|| match severity {
            Severity::Debug => tracing::debug!(
                target: "logsink",
                {
                    logsink.logger = name,
                    logsink.caller = caller,
                    logsink.attrs = %attrs
                },
                "{}",
                msg
            ),
            Severity::Info => tracing::info!(
                target: "logsink",
                {
                    logsink.logger = name,
                    logsink.caller = caller,
                    logsink.attrs = %attrs
                },
                "{}",
                msg
            ),
            Severity::Warn => tracing::warn!(
                target: "logsink",
                {
                    logsink.logger = name,
                    logsink.caller = caller,
                    logsink.attrs = %attrs
                },
                "{}",
                msg
            ),
            Severity::Error => tracing::error!(
                target: "logsink",
                {
                    logsink.logger = name,
                    logsink.caller = caller,
                    logsink.attrs = %attrs
                },
                "{}",
                msg
            ),
        });
    }
}

/// Renders key-value attributes as a JSON object for the encoders to merge
struct Attrs<'a>(&'a [(&'a str, Value)]);

impl fmt::Display for Attrs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object: Map<String, Value> = self
            .0
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        let text = serde_json::to_string(&object).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Flushes sinks and closes log files when run or dropped.
///
/// Flush errors are ignored. Files are closed in the order they were opened;
/// afterwards records sent to a file sink are discarded.
#[derive(Default)]
pub struct Cleanup {
    writers: Vec<SinkWriter>,
    files: Vec<SinkWriter>,
}

impl Cleanup {
    pub fn run(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for writer in self.writers.drain(..) {
            let _ = writer.flush();
        }
        for file in self.files.drain(..) {
            file.close();
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("writers", &self.writers.len())
            .field("files", &self.files.len())
            .finish()
    }
}
