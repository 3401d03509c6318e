//! Strongly-typed record schema shared by the ingestion and query pipelines
//!
//! This module defines the log record, its severity levels, the query filter
//! set, and the line encoding used for durable storage.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between the fields of an encoded record
pub const FIELD_SEPARATOR: char = ' ';

/// Delimiter between encoded records
pub const RECORD_DELIMITER: char = '\n';

/// Severity of a log record, ordered from least to most severe
///
/// The discriminant is the ordinal written to disk, so the order of the
/// variants is part of the storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl LogLevel {
    /// All levels in ordinal order
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Position of this level in the fixed level set
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Inverse of [`LogLevel::ordinal`]; `None` outside the level set
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not part of the level set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown log level: {}", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    /// Parse a level name, ignoring ASCII case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// One immutable unit of log data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Caller-supplied epoch timestamp (seconds or milliseconds)
    pub timestamp: i64,
    /// Emitting component; must not contain whitespace
    pub service: String,
    pub level: LogLevel,
    /// Free text; must not contain a newline
    pub message: String,
}

/// Reason a record cannot be stored without corrupting the line format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    EmptyService,
    WhitespaceInService,
    NewlineInMessage,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::EmptyService => f.write_str("Service must not be empty"),
            RecordError::WhitespaceInService => f.write_str("Service must not contain whitespace"),
            RecordError::NewlineInMessage => f.write_str("Message must not contain a newline"),
        }
    }
}

impl std::error::Error for RecordError {}

impl LogRecord {
    pub fn new(
        timestamp: i64,
        service: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            service: service.into(),
            level,
            message: message.into(),
        }
    }

    /// Check the constraints the line encoding relies on
    ///
    /// The pipelines never call this themselves; it is meant for the
    /// boundary that accepts records from the outside.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.service.is_empty() {
            return Err(RecordError::EmptyService);
        }
        if self.service.chars().any(char::is_whitespace) {
            return Err(RecordError::WhitespaceInService);
        }
        if self.message.contains(['\n', '\r']) {
            return Err(RecordError::NewlineInMessage);
        }
        Ok(())
    }

    /// Append the storage encoding of this record, delimiter included
    pub fn encode_into(&self, buf: &mut String) {
        use std::fmt::Write;
        // Writing into a String cannot fail
        let _ = write!(
            buf,
            "{ts}{sep}{service}{sep}{level}{sep}{message}{delim}",
            ts = self.timestamp,
            service = self.service,
            level = self.level.ordinal(),
            message = self.message,
            sep = FIELD_SEPARATOR,
            delim = RECORD_DELIMITER,
        );
    }

    /// Storage encoding of this record, delimiter included
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.service.len() + self.message.len() + 24);
        self.encode_into(&mut line);
        line
    }

    /// Decode one stored line (without its delimiter)
    ///
    /// Returns `None` when the timestamp, service or level ordinal cannot be
    /// read. A missing message decodes as empty.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut fields = line.splitn(4, FIELD_SEPARATOR);

        let timestamp = fields.next()?.parse::<i64>().ok()?;
        let service = fields.next().filter(|s| !s.is_empty())?;
        let level = fields
            .next()?
            .parse::<u8>()
            .ok()
            .and_then(LogLevel::from_ordinal)?;
        let message = fields.next().unwrap_or("");

        Some(Self::new(timestamp, service, level, message))
    }
}

impl fmt::Display for LogRecord {
    /// Human-readable single line: `timestamp service LEVEL message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp, self.service, self.level, self.message
        )
    }
}

/// Optional filters applied to a query; `None` means no constraint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub service: Option<String>,
    /// Inclusive lower timestamp bound
    #[serde(default)]
    pub from: Option<i64>,
    /// Inclusive upper timestamp bound
    #[serde(default)]
    pub to: Option<i64>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// True when `from` and `to` are both set and `from > to`
    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }

    /// Whether a record passes every present filter
    pub fn matches(&self, record: &LogRecord) -> bool {
        if self.level.is_some_and(|level| level != record.level) {
            return false;
        }
        if self.from.is_some_and(|from| from > record.timestamp) {
            return false;
        }
        if self.to.is_some_and(|to| to < record.timestamp) {
            return false;
        }
        if self
            .service
            .as_deref()
            .is_some_and(|service| service != record.service)
        {
            return false;
        }
        true
    }
}
