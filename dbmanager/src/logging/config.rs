//! Logger settings

use std::path::PathBuf;

use crate::logging::{LogLevel, LoggingError};

/// Capacity of the queue between emitters and the listener thread
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Logger name, printed in every record
    pub logger_name: String,

    /// Minimum level for the logger and all of its sinks (default: INFO)
    pub logging_level: LogLevel,

    /// Also write to `logs_dir/log_file`
    pub log_to_file: bool,

    /// Directory holding the log file, created on demand
    pub logs_dir: Option<PathBuf>,

    /// Log file name
    pub log_file: String,

    /// Bounded queue size (default: 1000)
    pub queue_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            logger_name: "sa.manager".to_string(),
            logging_level: LogLevel::Info,
            log_to_file: false,
            logs_dir: Some(PathBuf::from("logs")),
            log_file: "sa-manager.log".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LoggerConfig {
    /// Validate the file sink parameters without touching the filesystem.
    ///
    /// Returns the full path of the log file.
    pub fn file_target(&self) -> Result<PathBuf, LoggingError> {
        let dir = self
            .logs_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(LoggingError::InvalidFileParameters)?;

        if self.log_file.trim().is_empty() {
            return Err(LoggingError::InvalidFileParameters);
        }

        Ok(dir.join(&self.log_file))
    }
}
