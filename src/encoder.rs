//! Record capture and encoders
//!
//! A `Record` is captured once per event and then encoded for every sink
//! that accepts it, so all sinks agree on timestamp, caller and stack trace.
//! `JsonEncoder` writes one JSON object per line with fixed key names;
//! `ConsoleEncoder` writes a tab-separated line for humans.

use std::backtrace::Backtrace;
use std::fmt::{self, Write as _};

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level};

use crate::level::Severity;

pub const TS_KEY: &str = "ts";
pub const LEVEL_KEY: &str = "level";
pub const LOGGER_KEY: &str = "logger";
pub const CALLER_KEY: &str = "caller";
pub const MESSAGE_KEY: &str = "msg";
pub const STACKTRACE_KEY: &str = "stacktrace";

/// Prefix given to attributes whose key collides with a reserved key
pub const COLLISION_PREFIX: &str = "fields.";

// Fields set by `Logger`'s emission methods in place of event metadata
pub(crate) const LOGGER_FIELD: &str = "logsink.logger";
pub(crate) const CALLER_FIELD: &str = "logsink.caller";
pub(crate) const ATTRS_FIELD: &str = "logsink.attrs";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

// Frames at or below these belong to the logger, not the caller
const INTERNAL_FRAMES: [&str; 2] = [
    "logsink::logging::Logger::",
    "tracing_core::event::Event::dispatch",
];

/// Everything an encoder writes for one event
#[derive(Debug, Clone)]
pub struct Record {
    ts: String,
    severity: Severity,
    logger: String,
    caller: Option<String>,
    message: String,
    attrs: Map<String, Value>,
    stacktrace: Option<String>,
}

impl Record {
    pub fn capture(event: &Event<'_>) -> Self {
        let meta = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let caller = visitor.caller.or_else(|| {
            meta.file()
                .map(|file| short_caller(file, meta.line().unwrap_or(0)))
        });
        let logger = visitor
            .logger
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| meta.target().to_string());
        let stacktrace = (*meta.level() == Level::ERROR)
            .then(|| trim_backtrace(&Backtrace::force_capture().to_string()));

        Record {
            ts: chrono::Local::now().format(TIME_FORMAT).to_string(),
            severity: Severity::from_level(meta.level()),
            logger,
            caller,
            message: visitor.message,
            attrs: visitor.attrs,
            stacktrace,
        }
    }
}

/// Trim a source path to its last directory and file name, plus the line
pub fn short_caller(file: &str, line: u32) -> String {
    let trimmed = file.replace('\\', "/");
    let mut parts = trimmed.rsplitn(3, '/');
    let name = parts.next().unwrap_or_default();
    match parts.next() {
        Some(dir) if !dir.is_empty() => format!("{dir}/{name}:{line}"),
        _ => format!("{name}:{line}"),
    }
}

/// Drop the frames of a rendered backtrace up to and including the last
/// logger-internal frame. Left untouched when no internal frame is found.
pub fn trim_backtrace(rendered: &str) -> String {
    let mut frames: Vec<Vec<&str>> = Vec::new();
    for line in rendered.lines() {
        if is_frame_start(line) || frames.is_empty() {
            frames.push(vec![line]);
        } else if let Some(frame) = frames.last_mut() {
            frame.push(line);
        }
    }

    let last_internal = frames.iter().rposition(|frame| {
        frame
            .first()
            .is_some_and(|head| INTERNAL_FRAMES.iter().any(|marker| head.contains(marker)))
    });

    match last_internal {
        Some(index) if index + 1 < frames.len() => frames[index + 1..]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
        _ => rendered.trim_end().to_string(),
    }
}

// "  12: symbol" starts a frame; "at file:line" lines continue it
fn is_frame_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    logger: Option<String>,
    caller: Option<String>,
    attrs: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.attrs.insert(field.name().to_string(), value);
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            LOGGER_FIELD => self.logger = Some(value.to_string()),
            CALLER_FIELD => self.caller = Some(value.to_string()),
            _ => self.insert(field, Value::from(value)),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        match field.name() {
            "message" => self.message = text,
            LOGGER_FIELD => self.logger = Some(text),
            CALLER_FIELD => self.caller = Some(text),
            ATTRS_FIELD => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(attrs) => self.attrs.extend(attrs),
                Err(_) => self.insert(field, Value::from(text)),
            },
            _ => self.insert(field, Value::from(text)),
        }
    }
}

/// Machine-parseable encoder: one JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn encode(&self, record: &Record) -> Result<String, serde_json::Error> {
        let mut object = Map::new();
        object.insert(TS_KEY.into(), Value::from(record.ts.as_str()));
        object.insert(LEVEL_KEY.into(), Value::from(record.severity.as_str()));
        object.insert(LOGGER_KEY.into(), Value::from(record.logger.as_str()));
        if let Some(caller) = &record.caller {
            object.insert(CALLER_KEY.into(), Value::from(caller.as_str()));
        }
        object.insert(MESSAGE_KEY.into(), Value::from(record.message.as_str()));
        if let Some(stacktrace) = &record.stacktrace {
            object.insert(STACKTRACE_KEY.into(), Value::from(stacktrace.as_str()));
        }
        for (key, value) in &record.attrs {
            let key = if object.contains_key(key) {
                format!("{COLLISION_PREFIX}{key}")
            } else {
                key.clone()
            };
            object.insert(key, value.clone());
        }

        let mut line = serde_json::to_string(&object)?;
        line.push('\n');
        Ok(line)
    }
}

/// Human-oriented encoder used for the console in developer mode
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEncoder {
    ansi: bool,
}

impl ConsoleEncoder {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }

    pub fn encode(&self, record: &Record) -> Result<String, fmt::Error> {
        let mut line = String::new();
        line.push_str(&record.ts);
        line.push('\t');
        if self.ansi {
            write!(line, "{}{:<5}\x1b[0m", level_color(record.severity), record.severity)?;
        } else {
            write!(line, "{:<5}", record.severity)?;
        }
        write!(line, "\t{}", record.logger)?;
        if let Some(caller) = &record.caller {
            write!(line, "\t{}", caller)?;
        }
        write!(line, "\t{}", record.message)?;
        if !record.attrs.is_empty() {
            let attrs = serde_json::to_string(&record.attrs).map_err(|_| fmt::Error)?;
            write!(line, "\t{}", attrs)?;
        }
        line.push('\n');
        if let Some(stacktrace) = &record.stacktrace {
            writeln!(line, "{}", stacktrace.trim_end())?;
        }
        Ok(line)
    }
}

fn level_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[0;31m",
        Severity::Warn => "\x1b[0;33m",
        Severity::Info => "\x1b[0;32m",
        Severity::Debug => "\x1b[0;34m",
    }
}
