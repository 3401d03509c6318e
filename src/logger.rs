//! Fan-out dispatcher over registered sinks

use crate::schema::LogRecord;
use crate::sink::Sink;
use std::io;
use std::sync::Arc;

/// Forwards every record to every registered [`Sink`], in registration order
pub struct Logger {
    sinks: Vec<Arc<dyn Sink>>,
}

impl Logger {
    /// Create a logger with its first sink
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sinks: vec![sink] }
    }

    /// Register another sink; it receives every record logged afterwards
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) {
        tracing::debug!(sink = sink.name(), "registered sink");
        self.sinks.push(sink);
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    /// Deliver a record to each sink; returns once every `write` has returned
    pub fn log(&self, record: &LogRecord) {
        for sink in &self.sinks {
            sink.write(record);
        }
    }

    /// Flush every sink in registration order
    ///
    /// Every sink is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn flush(&self) -> io::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                tracing::error!(sink = sink.name(), error = %e, "failed to flush sink");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
