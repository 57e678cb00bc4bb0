//! Log sinks and the queue listener
//!
//! Sinks are owned by the listener thread; emitters only see the sending
//! half of the queue.

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use crate::logging::formatter::{LogFormatter, LogLevel, LogRecord};
use crate::logging::LoggingError;

/// Destination for formatted log lines
pub trait LogSink: Send {
    /// Records below this level are skipped by the sink.
    fn level(&self) -> LogLevel;

    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Flush and release the underlying resource.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Writes to stderr, or to any writer handed in
pub struct ConsoleSink {
    level: LogLevel,
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    pub fn stderr(level: LogLevel) -> Self {
        Self::with_writer(level, io::stderr())
    }

    pub fn with_writer<W: Write + Send + 'static>(level: LogLevel, out: W) -> Self {
        Self {
            level,
            out: Box::new(out),
        }
    }
}

impl LogSink for ConsoleSink {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Appends to a log file
pub struct FileSink {
    level: LogLevel,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create the parent directory if needed and open the file for appending.
    pub fn open(path: &Path, level: LogLevel) -> Result<Self, LoggingError> {
        let io_error = |source| LoggingError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;

        Ok(Self {
            level,
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writeln!(writer, "{line}"),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "log file already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Keeps lines in memory; clones share the same buffer
#[derive(Clone)]
pub struct MemorySink {
    level: LogLevel,
    lines: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            lines: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Start the listener thread.
///
/// The thread drains `receiver` until every sender is gone, then flushes
/// and closes all sinks.
pub(crate) fn spawn_listener(
    name: &str,
    receiver: Receiver<LogRecord>,
    sinks: Vec<Box<dyn LogSink>>,
    formatter: LogFormatter,
) -> Result<JoinHandle<()>, LoggingError> {
    thread::Builder::new()
        .name(format!("{name}-log-listener"))
        .spawn(move || listen(receiver, sinks, formatter))
        .map_err(LoggingError::Spawn)
}

fn listen(receiver: Receiver<LogRecord>, mut sinks: Vec<Box<dyn LogSink>>, formatter: LogFormatter) {
    debug!(sinks = sinks.len(), "log listener started");

    for record in receiver.iter() {
        let line = formatter.format(&record);
        for sink in sinks.iter_mut().filter(|sink| record.level >= sink.level()) {
            if let Err(e) = sink.write_line(&line) {
                error!(error = %e, "failed to write log record");
            }
        }

        // flush once the burst is written
        if receiver.is_empty() {
            for sink in sinks.iter_mut() {
                if let Err(e) = sink.flush() {
                    error!(error = %e, "failed to flush log sink");
                }
            }
        }
    }

    for sink in sinks.iter_mut() {
        if let Err(e) = sink.close() {
            error!(error = %e, "failed to close log sink");
        }
    }

    debug!("log listener stopped");
}
