//! Fan-out layer
//!
//! One `Layer` owns every sink. Each event is captured into a `Record` once
//! and encoded separately for each sink whose level accepts it. Write and
//! encode failures are dropped.

use std::io::Write;

use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};

use crate::encoder::{ConsoleEncoder, JsonEncoder, Record};
use crate::sink::{Encoding, SinkWriter};

/// A materialized sink: encoding, destination and level filter
pub(crate) struct Sink {
    pub encoding: Encoding,
    pub ansi: bool,
    pub filter: LevelFilter,
    pub writer: SinkWriter,
}

impl Sink {
    fn accepts(&self, level: &Level) -> bool {
        *level <= self.filter
    }

    fn encode(&self, record: &Record) -> Option<String> {
        match self.encoding {
            Encoding::Json => JsonEncoder.encode(record).ok(),
            Encoding::Console => ConsoleEncoder::new(self.ansi).encode(record).ok(),
        }
    }

    fn write(&self, line: &str) {
        let _ = self.writer.make_writer().write_all(line.as_bytes());
    }
}

pub(crate) struct FanoutLayer {
    sinks: Vec<Sink>,
}

impl FanoutLayer {
    pub fn new(sinks: Vec<Sink>) -> Self {
        Self { sinks }
    }
}

impl<S: Subscriber> Layer<S> for FanoutLayer {
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        self.sinks.iter().any(|sink| sink.accepts(metadata.level()))
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        self.sinks.iter().map(|sink| sink.filter).max()
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if !self.sinks.iter().any(|sink| sink.accepts(level)) {
            return;
        }

        let record = Record::capture(event);
        for sink in self.sinks.iter().filter(|sink| sink.accepts(level)) {
            if let Some(line) = sink.encode(&record) {
                sink.write(&line);
            }
        }
    }
}
