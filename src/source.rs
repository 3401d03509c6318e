//! Source capability: anything that can answer a filtered query

use crate::schema::{LogRecord, QueryParams};
use std::io;

/// A store of previously recorded log records
///
/// Implementations hold their own read access, independent of whichever
/// sink writes the store.
pub trait Source: Send + Sync {
    /// Stable identifier used in diagnostics
    fn name(&self) -> &str;

    /// Every stored record passing all filters present in `params`
    ///
    /// Zero matches is an empty vector, never an error. Errors are reserved
    /// for failures to read the store itself.
    fn query(&self, params: &QueryParams) -> io::Result<Vec<LogRecord>>;
}
