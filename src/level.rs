use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// The process is about to exit.
    Fatal,
    /// The process is about to unwind.
    Panic,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Panic => "panic",
        }
    }

    /// Upper-cased level text truncated to four characters (`INFO`, `ERRO`, ...).
    pub fn short_label(&self) -> &'static str {
        match self {
            Self::Trace => "TRAC",
            Self::Debug => "DEBU",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERRO",
            Self::Fatal => "FATA",
            Self::Panic => "PANI",
        }
    }

    /// Error and above; these are routed to the error stream when separation is on.
    pub fn is_error(&self) -> bool {
        *self >= Self::Error
    }

    /// Fatal and above; buffered output is flushed before control returns to the caller.
    pub fn may_terminate(&self) -> bool {
        *self >= Self::Fatal
    }

    /// Parse a level name, falling back to `Info` for anything unrecognized.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Info)
    }

    /// The closest `tracing` filter directive for this severity.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Self::Fatal | Self::Panic => "error",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            "panic" => Ok(Self::Panic),
            other => Err(Error::Config(format!("unknown log level: {}", other))),
        }
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => Self::Info,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::TRACE => Self::Trace,
        }
    }
}
