//! Synchronous sink printing human-readable lines

use crate::schema::LogRecord;
use crate::sink::Sink;
use std::io::{self, Write};
use std::sync::Mutex;

/// Writes every record as `timestamp service LEVEL message` to a stream
///
/// Defaults to standard output. Each write is emitted immediately.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for ConsoleSink<io::Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    /// Create a console sink over any writer (used for tests and stderr)
    pub fn with_writer(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Consume the sink and return the underlying writer
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "ConsoleSink"
    }

    fn write(&self, record: &LogRecord) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{}", record).and_then(|_| out.flush()) {
            tracing::warn!(sink = self.name(), error = %e, "failed to write record");
        }
    }

    fn flush(&self) -> io::Result<()> {
        self.out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .flush()
    }
}
