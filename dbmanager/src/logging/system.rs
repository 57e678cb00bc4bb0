//! Logger lifecycle
//!
//! Owns the sending half of the queue, the listener thread and the record
//! filters. Shutdown drains the queue into every sink before returning.

use crossbeam::channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::logging::config::LoggerConfig;
use crate::logging::formatter::{LogFormatter, LogLevel, LogRecord};
use crate::logging::writer::{spawn_listener, ConsoleSink, FileSink, LogSink};
use crate::logging::LoggingError;

type RecordFilter = Box<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// Builds a [`Logger`] with extra or replacement sinks
pub struct LoggerBuilder {
    config: LoggerConfig,
    console: Option<ConsoleSink>,
    sinks: Vec<Box<dyn LogSink>>,
}

impl LoggerBuilder {
    pub fn new(config: LoggerConfig) -> Self {
        let console = ConsoleSink::stderr(config.logging_level);
        Self {
            config,
            console: Some(console),
            sinks: Vec::new(),
        }
    }

    /// Send console output to `out` instead of stderr.
    pub fn console_writer<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.console = Some(ConsoleSink::with_writer(self.config.logging_level, out));
        self
    }

    /// Drop the console sink.
    pub fn without_console(mut self) -> Self {
        self.console = None;
        self
    }

    /// Register an additional sink.
    pub fn with_sink<S: LogSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<Logger, LoggingError> {
        let Self {
            config,
            console,
            sinks: extra,
        } = self;

        // validate before anything touches the filesystem
        let file_target = if config.log_to_file {
            Some(config.file_target()?)
        } else {
            None
        };

        let mut sinks: Vec<Box<dyn LogSink>> = Vec::new();
        if let Some(console) = console {
            sinks.push(Box::new(console));
        }
        if let Some(path) = &file_target {
            sinks.push(Box::new(FileSink::open(path, config.logging_level)?));
        }
        sinks.extend(extra);

        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let listener = spawn_listener(&config.logger_name, receiver, sinks, LogFormatter::new())?;

        debug!(
            logger = %config.logger_name,
            level = %config.logging_level,
            file = ?file_target,
            "logger started"
        );

        Ok(Logger {
            name: Arc::from(config.logger_name.as_str()),
            level: config.logging_level,
            sender: RwLock::new(Some(sender)),
            listener: Mutex::new(Some(listener)),
            filters: RwLock::new(Vec::new()),
            dropped: AtomicU64::new(0),
        })
    }
}

/// Named logger with non-blocking, queued delivery
///
/// Records never propagate anywhere but this logger's own sinks.
pub struct Logger {
    name: Arc<str>,
    level: LogLevel,
    sender: RwLock<Option<Sender<LogRecord>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    filters: RwLock<Vec<RecordFilter>>,
    dropped: AtomicU64,
}

impl Logger {
    /// Console sink, plus a file sink when `log_to_file` is set.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggingError> {
        LoggerBuilder::new(config).build()
    }

    pub fn builder(config: LoggerConfig) -> LoggerBuilder {
        LoggerBuilder::new(config)
    }

    /// Run `body` with a fresh logger and shut it down afterwards.
    pub fn scoped<T>(config: LoggerConfig, body: impl FnOnce(&Logger) -> T) -> Result<T, LoggingError> {
        let logger = Self::new(config)?;
        let result = body(&logger);
        logger.shutdown();
        Ok(result)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    /// Records rejected because the queue was full or already shut down
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Only records for which every filter returns `true` are delivered.
    pub fn add_filter<F>(&self, filter: F)
    where
        F: Fn(&LogRecord) -> bool + Send + Sync + 'static,
    {
        self.filters.write().push(Box::new(filter));
    }

    pub fn filter_count(&self) -> usize {
        self.filters.read().len()
    }

    /// Enqueue a record. Never waits for the sinks.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.is_enabled_for(level) {
            return;
        }

        let record = LogRecord::new(self.name.clone(), level, message);
        if !self.filters.read().iter().all(|filter| filter(&record)) {
            return;
        }

        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(logger = %self.name, dropped, "log queue full, dropping records");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    /// Stop the listener after it has delivered every queued record, close
    /// all sinks and clear the filters. Safe to call more than once.
    pub fn shutdown(&self) {
        // dropping the only sender ends the listener loop once the queue is empty
        let sender = self.sender.write().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if let Some(listener) = self.listener.lock().take() {
            if listener.join().is_err() {
                warn!(logger = %self.name, "log listener panicked");
            }
        }

        self.filters.write().clear();
        debug!(logger = %self.name, "logger shut down");
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
