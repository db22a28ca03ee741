use std::path::PathBuf;

/// Errors returned while building a logger
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level: {0:?}")]
    InvalidLevel(String),
    #[error("can't open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
