//! logkeep library components
//!
//! The ingestion pipeline ([`Logger`] fanning out to [`Sink`]s) and the query
//! engine ([`Querier`] fanning in from [`Source`]s), plus the HTTP boundary
//! and configuration used by the `logkeep` binary.

pub mod config;
pub mod console_sink;
pub mod file_sink;
pub mod file_source;
pub mod logger;
pub mod querier;
pub mod schema;
pub mod server;
pub mod sink;
pub mod source;

// Re-export commonly used types
pub use console_sink::ConsoleSink;
pub use file_sink::{FileSink, SinkState};
pub use file_source::FileSource;
pub use logger::Logger;
pub use querier::Querier;
pub use schema::{LogLevel, LogRecord, QueryParams};
pub use sink::Sink;
pub use source::Source;
