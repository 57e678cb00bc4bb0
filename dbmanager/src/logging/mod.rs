//! Queued logger
//!
//! A named logger whose records are handed to a bounded queue and written to
//! the sinks by a dedicated listener thread, so emitting never waits on
//! console or file I/O.
//!
//! # Usage
//! ```no_run
//! use dbmanager::logging::{Logger, LoggerConfig};
//!
//! let logger = Logger::new(LoggerConfig {
//!     logger_name: "orders".to_string(),
//!     ..LoggerConfig::default()
//! })?;
//!
//! logger.info("service started");
//! logger.shutdown();
//! # Ok::<(), dbmanager::logging::LoggingError>(())
//! ```

pub mod config;
pub mod formatter;
pub mod system;
pub mod writer;

pub use config::LoggerConfig;
pub use formatter::{LogFormatter, LogLevel, LogRecord};
pub use system::{Logger, LoggerBuilder};
pub use writer::{ConsoleSink, FileSink, LogSink, MemorySink};

use std::path::PathBuf;
use thiserror::Error;

/// Logger construction errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Check log file name and path to logs directory are correct.")]
    InvalidFileParameters,

    #[error("failed to open log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start log listener thread: {0}")]
    Spawn(#[source] std::io::Error),
}
