//! The structured log entry handed to the sink.

use serde_json::Value;
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::Severity;

/// Field holding `<short file>:<line>` of the call site.
pub const FILE_FIELD: &str = "FILE";
/// Field holding the short function (or module) name of the call site.
pub const FUNC_FIELD: &str = "FUNC";

/// Source location of a log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
    pub function: Option<String>,
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
    pub fields: BTreeMap<String, Value>,
    pub timestamp: OffsetDateTime,
    pub caller: Option<Caller>,
}

impl LogEntry {
    /// Create an entry stamped with the current UTC time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: BTreeMap::new(),
            timestamp: OffsetDateTime::now_utc(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_caller(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: Option<impl Into<String>>,
    ) -> Self {
        self.caller = Some(Caller {
            file: file.into(),
            line,
            function: function.map(Into::into),
        });
        self
    }
}

/// `/src/app/main.rs` + 12 -> `main.rs:12`. Windows separators are handled too.
pub fn short_file_name(file: &str, line: u32) -> String {
    let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
    format!("{}:{}", name, line)
}

/// Last segment of a `::` or `.` separated path.
pub fn short_function_name(function: &str) -> &str {
    let tail = function.rsplit("::").next().unwrap_or(function);
    tail.rsplit('.').next().unwrap_or(tail)
}
