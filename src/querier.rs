//! Fan-in aggregator over registered sources

use crate::schema::{LogRecord, QueryParams};
use crate::source::Source;
use std::io;
use std::sync::Arc;

/// Runs a query against every registered [`Source`] and concatenates results
///
/// Results keep source registration order and each source's own order; no
/// sorting or de-duplication happens across sources.
pub struct Querier {
    sources: Vec<Arc<dyn Source>>,
}

impl Querier {
    /// Create a querier with its first source
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            sources: vec![source],
        }
    }

    pub fn add_source(&mut self, source: Arc<dyn Source>) {
        tracing::debug!(source = source.name(), "registered source");
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    pub fn query(&self, params: &QueryParams) -> io::Result<Vec<LogRecord>> {
        let mut result = Vec::new();
        for source in &self.sources {
            let partial = source.query(params)?;
            result.extend(partial);
        }
        Ok(result)
    }
}
