//! Sink capability: anything that can record a [`LogRecord`]

use crate::schema::LogRecord;
use std::io;

/// A destination for log records
///
/// Implementations own their output resource exclusively. `write` must not
/// surface ordinary I/O failures to the caller; a sink that cannot acquire
/// its resource fails in its constructor instead.
pub trait Sink: Send + Sync {
    /// Stable identifier used in diagnostics
    fn name(&self) -> &str;

    /// Record one log record
    fn write(&self, record: &LogRecord);

    /// Force buffered records to the backing resource, blocking until done
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
