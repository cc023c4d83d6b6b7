//! Turning a [`LogEntry`] into one line of bytes.

use serde_json::{Map, Value};
use std::fmt::Write as _;
use time::format_description::OwnedFormatItem;

use crate::{LogEntry, Result, Severity};

/// Serializes entries for the file and console outputs.
pub trait EntryFormatter: Send + Sync {
    /// Render `entry` as a single newline-terminated line.
    fn format(&self, entry: &LogEntry, colors: bool) -> Result<Vec<u8>>;
}

fn parse_timestamp_format(format: Option<&str>) -> Result<Option<OwnedFormatItem>> {
    Ok(match format {
        Some(format) => Some(time::format_description::parse_owned::<1>(format)?),
        None => None,
    })
}

fn level_color(severity: Severity) -> u8 {
    match severity {
        Severity::Trace | Severity::Debug => 37,
        Severity::Info => 36,
        Severity::Warn => 33,
        Severity::Error | Severity::Fatal | Severity::Panic => 31,
    }
}

/// `INFO[2026-01-09 15:04:05.000] message key=value`
#[derive(Debug)]
pub struct TextFormatter {
    timestamp: Option<OwnedFormatItem>,
}

impl TextFormatter {
    /// `timestamp_format` uses the `time` crate's format description syntax; `None` omits it.
    pub fn new(timestamp_format: Option<&str>) -> Result<Self> {
        Ok(Self {
            timestamp: parse_timestamp_format(timestamp_format)?,
        })
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| !(c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+')))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) if !needs_quoting(s) => out.push_str(s),
        Value::String(s) => {
            let _ = write!(out, "{:?}", s);
        }
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

impl EntryFormatter for TextFormatter {
    fn format(&self, entry: &LogEntry, colors: bool) -> Result<Vec<u8>> {
        let mut out = String::with_capacity(64 + entry.message.len());
        let label = entry.severity.short_label();
        if colors {
            let _ = write!(out, "\x1b[{}m{}\x1b[0m", level_color(entry.severity), label);
        } else {
            out.push_str(label);
        }
        if let Some(format) = &self.timestamp {
            out.push('[');
            out.push_str(&entry.timestamp.format(format)?);
            out.push(']');
        }
        out.push(' ');
        out.push_str(entry.message.trim_end_matches('\n'));

        for (key, value) in &entry.fields {
            out.push(' ');
            if colors {
                let _ = write!(out, "\x1b[{}m{}\x1b[0m=", level_color(entry.severity), key);
            } else {
                out.push_str(key);
                out.push('=');
            }
            write_value(&mut out, value);
        }
        out.push('\n');
        Ok(out.into_bytes())
    }
}

/// One JSON object per line with `level`, `msg` and `time` keys next to the fields.
#[derive(Debug)]
pub struct JsonFormatter {
    timestamp: Option<OwnedFormatItem>,
}

impl JsonFormatter {
    pub fn new(timestamp_format: Option<&str>) -> Result<Self> {
        Ok(Self {
            timestamp: parse_timestamp_format(timestamp_format)?,
        })
    }
}

impl EntryFormatter for JsonFormatter {
    fn format(&self, entry: &LogEntry, _colors: bool) -> Result<Vec<u8>> {
        let mut object = Map::new();
        for (key, value) in &entry.fields {
            let key = match key.as_str() {
                "level" | "msg" | "time" => format!("fields.{}", key),
                _ => key.clone(),
            };
            object.insert(key, value.clone());
        }
        object.insert("level".to_string(), Value::from(entry.severity.as_str()));
        object.insert("msg".to_string(), Value::from(entry.message.as_str()));
        if let Some(format) = &self.timestamp {
            object.insert("time".to_string(), Value::from(entry.timestamp.format(format)?));
        }

        let mut line = serde_json::to_vec(&Value::Object(object))?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::strip_ansi;
    use time::macros::datetime;

    const TS: &str = "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]";

    fn entry() -> LogEntry {
        LogEntry::new(Severity::Info, "server started")
            .with_timestamp(datetime!(2026-01-09 15:04:05.250 UTC))
            .with_field("port", 8080)
            .with_field("host", "db-1.local")
            .with_field("note", "two words")
    }

    #[test]
    fn test_text_plain() {
        let fmt = TextFormatter::new(Some(TS)).unwrap();
        let line = String::from_utf8(fmt.format(&entry(), false).unwrap()).unwrap();
        assert_eq!(
            line,
            "INFO[2026-01-09 15:04:05.250] server started host=db-1.local note=\"two words\" port=8080\n"
        );
    }

    #[test]
    fn test_text_colors_strip_to_plain() {
        let fmt = TextFormatter::new(Some(TS)).unwrap();
        let colored = fmt.format(&entry(), true).unwrap();
        assert!(colored.starts_with(b"\x1b[36mINFO\x1b[0m"));
        assert_eq!(
            strip_ansi(&colored).into_owned(),
            fmt.format(&entry(), false).unwrap()
        );
    }

    #[test]
    fn test_text_without_timestamp() {
        let fmt = TextFormatter::new(None).unwrap();
        let line = fmt
            .format(&LogEntry::new(Severity::Error, "boom"), false)
            .unwrap();
        assert_eq!(line, b"ERRO boom\n");
    }

    #[test]
    fn test_invalid_timestamp_format() {
        assert!(TextFormatter::new(Some("[bogus]")).is_err());
    }

    #[test]
    fn test_json_line() {
        let fmt = JsonFormatter::new(Some(TS)).unwrap();
        let entry = entry().with_field("msg", "clash");
        let line = fmt.format(&entry, true).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));

        let value: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["msg"], "server started");
        assert_eq!(value["time"], "2026-01-09 15:04:05.250");
        assert_eq!(value["fields.msg"], "clash");
        assert_eq!(value["port"], 8080);
    }
}
