//! Structured logger construction.
//!
//! Build a [`Logger`] and its [`Cleanup`] from a [`LogConfig`]: records fan
//! out to a log file (JSON lines), the console (JSON, or a human-oriented
//! layout in developer mode), or standard error when neither is configured.

pub mod config;
pub mod encoder;
pub mod error;
mod fanout;
pub mod level;
pub mod logging;
pub mod metrics;
pub mod sink;

pub use config::{LogConfig, load_config};
pub use error::LoggingError;
pub use level::Severity;
pub use logging::{Cleanup, Logger, LoggerFactory, new_logger};
pub use metrics::Metrics;
pub use sink::SinkWriter;
