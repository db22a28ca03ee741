use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::level::Severity;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Records accepted by the configured level, by severity
    pub records_total: IntCounterVec,

    // Sinks attached to the most recently built logger
    pub sinks: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let records_total = IntCounterVec::new(
            Opts::new(
                "logsink_records_total",
                "Total number of log records accepted by the level filter",
            ),
            &["level"],
        )?;

        let sinks = IntGauge::new("logsink_sinks", "Number of sinks the logger fans out to")?;

        registry.register(Box::new(records_total.clone()))?;
        registry.register(Box::new(sinks.clone()))?;

        Ok(Metrics {
            registry,
            records_total,
            sinks,
        })
    }

    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub(crate) fn layer(&self) -> MetricsLayer {
        MetricsLayer {
            records_total: self.records_total.clone(),
        }
    }
}

/// Counts every event that reaches it
pub(crate) struct MetricsLayer {
    records_total: IntCounterVec,
}

impl<S: Subscriber> Layer<S> for MetricsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let severity = Severity::from_level(event.metadata().level());
        self.records_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }
}
