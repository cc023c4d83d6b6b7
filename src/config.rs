use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::rotation::SplitMode;
use crate::{Error, Result, Severity};

/// Directory used when retention is enabled but no directory was configured.
pub const DEFAULT_SAVE_PATH: &str = "./logs";

/// Parse a size string with an optional unit (K/M/G, case-insensitive). Plain numbers are bytes.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let Some(last) = s.chars().last() else {
        return Err("empty size string".to_string());
    };

    let (num_str, multiplier) = if last.is_alphabetic() {
        let multiplier = match last.to_ascii_uppercase() {
            'B' => 1,
            'K' => 1024,
            'M' => 1024 * 1024,
            'G' => 1024 * 1024 * 1024,
            unit => return Err(format!("invalid unit: {}, supported: K/M/G", unit)),
        };
        (&s[..s.len() - last.len_utf8()], multiplier)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Size value that can be a number or string with units.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(u64),
    String(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(de::Error::custom),
    }
}

/// Time zone used for date keys, size-split stamps and retention cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZone {
    /// The system's local offset, falling back to UTC when it cannot be determined.
    #[default]
    Local,
    Utc,
    Fixed(UtcOffset),
}

impl TimeZone {
    pub fn now(&self) -> OffsetDateTime {
        match self {
            Self::Local => OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            Self::Utc => OffsetDateTime::now_utc(),
            Self::Fixed(offset) => OffsetDateTime::now_utc().to_offset(*offset),
        }
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
            Self::Fixed(offset) => {
                let sign = if offset.is_negative() { '-' } else { '+' };
                write!(
                    f,
                    "{}{:02}:{:02}",
                    sign,
                    offset.whole_hours().unsigned_abs(),
                    offset.minutes_past_hour().unsigned_abs()
                )
            }
        }
    }
}

impl FromStr for TimeZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Utc),
            other => UtcOffset::parse(
                other,
                format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
            )
            .map(Self::Fixed)
            .map_err(|e| Error::Config(format!("invalid time zone {:?}: {}", s, e))),
        }
    }
}

impl Serialize for TimeZone {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeZone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Which writes count toward the size-split accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeScope {
    /// Bytes written to the error stream count too.
    #[default]
    Combined,
    /// Only bytes written to the normal stream count.
    NormalOnly,
}

/// Configuration for a log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory for log files; empty means the current directory
    #[serde(default)]
    pub log_dir: PathBuf,
    /// Suffix appended to every log file name
    #[serde(default)]
    pub file_name_suffix: String,
    /// Base file name when no split mode is active
    #[serde(default = "default_log_name")]
    pub default_log_name: String,
    /// Write error-and-above entries to a dedicated file
    #[serde(default)]
    pub error_separate: bool,
    /// With error separation, keep errors out of the normal file
    #[serde(default)]
    pub errors_not_in_normal: bool,
    /// Split files by day (exclusive with `max_log_size`)
    #[serde(default)]
    pub date_split: bool,
    /// Split files by size in bytes, 0 disables (exclusive with `date_split`)
    #[serde(default, deserialize_with = "deserialize_size")]
    pub max_log_size: u64,
    /// Disable file output entirely
    #[serde(default)]
    pub disable_file: bool,
    /// Disable console output
    #[serde(default)]
    pub no_console: bool,
    /// Omit timestamps from formatted entries
    #[serde(default)]
    pub no_timestamp: bool,
    /// `time` format description for timestamps
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Show the short file name on the console
    #[serde(default)]
    pub show_short_file_in_console: bool,
    /// Show the function name on the console
    #[serde(default)]
    pub show_func_in_console: bool,
    /// Do not attach caller information
    #[serde(default)]
    pub disable_caller: bool,
    /// Write directly instead of through the background flusher
    #[serde(default)]
    pub disable_write_buffer: bool,
    /// Size of the write buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    /// Maximum number of lines waiting for the flusher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Log format ("text" or "json")
    #[serde(default = "default_format")]
    pub format: String,
    /// Disable colors (file output is always stripped of them)
    #[serde(default)]
    pub disable_colors: bool,
    /// Days to keep log data, 0 disables retention
    #[serde(default)]
    pub max_keep_days: u32,
    /// Log file extension
    #[serde(default = "default_log_ext")]
    pub log_ext: String,
    /// Minimum level (panic, fatal, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Time zone for file names and retention
    #[serde(default)]
    pub time_zone: TimeZone,
    /// Fields appended to every entry
    #[serde(default)]
    pub extra_fields: BTreeMap<String, Value>,
    /// Files and folders ending with this marker survive retention
    #[serde(default = "default_keep_suffix")]
    pub keep_suffix: String,
    /// Which writes count toward `max_log_size`
    #[serde(default)]
    pub size_scope: SizeScope,
}

impl SinkConfig {
    /// Create a new SinkConfig with defaults
    pub fn new() -> Self {
        Self {
            log_dir: PathBuf::new(),
            file_name_suffix: String::new(),
            default_log_name: default_log_name(),
            error_separate: false,
            errors_not_in_normal: false,
            date_split: false,
            max_log_size: 0,
            disable_file: false,
            no_console: false,
            no_timestamp: false,
            timestamp_format: default_timestamp_format(),
            show_short_file_in_console: false,
            show_func_in_console: false,
            disable_caller: false,
            disable_write_buffer: false,
            write_buffer_size: default_buffer_size(),
            queue_capacity: default_queue_capacity(),
            format: default_format(),
            disable_colors: false,
            max_keep_days: 0,
            log_ext: default_log_ext(),
            level: default_log_level(),
            time_zone: TimeZone::default(),
            extra_fields: BTreeMap::new(),
            keep_suffix: default_keep_suffix(),
            size_scope: SizeScope::default(),
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_file_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_name_suffix = suffix.into();
        self
    }

    pub fn with_default_log_name(mut self, name: impl Into<String>) -> Self {
        self.default_log_name = name.into();
        self
    }

    /// Route error-and-above entries to their own file; `mirror` also keeps them in the normal file.
    pub fn with_error_separation(mut self, separate: bool, mirror: bool) -> Self {
        self.error_separate = separate;
        self.errors_not_in_normal = !mirror;
        self
    }

    pub fn with_date_split(mut self, date_split: bool) -> Self {
        self.date_split = date_split;
        self
    }

    pub fn with_max_log_size(mut self, bytes: u64) -> Self {
        self.max_log_size = bytes;
        self
    }

    pub fn with_file_disabled(mut self, disabled: bool) -> Self {
        self.disable_file = disabled;
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.no_console = !console;
        self
    }

    pub fn with_write_buffer(mut self, enabled: bool) -> Self {
        self.disable_write_buffer = !enabled;
        self
    }

    pub fn with_write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_max_keep_days(mut self, days: u32) -> Self {
        self.max_keep_days = days;
        self
    }

    pub fn with_log_ext(mut self, ext: impl Into<String>) -> Self {
        self.log_ext = ext.into();
        self
    }

    pub fn with_time_zone(mut self, tz: TimeZone) -> Self {
        self.time_zone = tz;
        self
    }

    /// Append a constant key/value to every entry.
    pub fn with_key_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_caller(mut self, enabled: bool) -> Self {
        self.disable_caller = !enabled;
        self
    }

    pub fn with_size_scope(mut self, scope: SizeScope) -> Self {
        self.size_scope = scope;
        self
    }

    /// Validate and fill in derived defaults.
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig> {
        let split = match (self.date_split, self.max_log_size) {
            (true, 0) => SplitMode::Date,
            (false, 0) => SplitMode::None,
            (false, max_size) => SplitMode::Size { max_size },
            (true, _) => {
                return Err(Error::Config(
                    "date split and size split cannot be enabled together".to_string(),
                ));
            }
        };

        let mut log_ext = if self.log_ext.is_empty() {
            default_log_ext()
        } else {
            self.log_ext.clone()
        };
        if !log_ext.starts_with('.') {
            log_ext.insert(0, '.');
        }

        let explicit_dir = !self.log_dir.as_os_str().is_empty();
        let log_dir = if explicit_dir {
            self.log_dir.clone()
        } else if self.max_keep_days > 0 {
            PathBuf::from(DEFAULT_SAVE_PATH)
        } else {
            PathBuf::from(".")
        };

        let default_log_name = if self.default_log_name.is_empty() {
            default_log_name()
        } else {
            self.default_log_name.clone()
        };
        let timestamp_format = if self.timestamp_format.is_empty() {
            default_timestamp_format()
        } else {
            self.timestamp_format.clone()
        };
        let buffer_size = if self.write_buffer_size == 0 {
            default_buffer_size()
        } else {
            self.write_buffer_size
        };

        Ok(ResolvedConfig {
            sweepable: explicit_dir || self.max_keep_days > 0,
            log_dir,
            file_name_suffix: self.file_name_suffix.clone(),
            default_log_name,
            error_separate: self.error_separate,
            errors_not_in_normal: self.errors_not_in_normal,
            split,
            file_enabled: !self.disable_file,
            console_enabled: !self.no_console,
            show_short_file_in_console: self.show_short_file_in_console,
            show_func_in_console: self.show_func_in_console,
            caller_enabled: !self.disable_caller,
            buffer_size: (!self.disable_write_buffer).then_some(buffer_size),
            queue_capacity: self.queue_capacity.max(1),
            json: self.format.eq_ignore_ascii_case("json"),
            colors: !self.disable_colors,
            timestamp_format: (!self.no_timestamp).then_some(timestamp_format),
            max_keep_days: self.max_keep_days,
            log_ext,
            level: Severity::parse_lenient(&self.level),
            time_zone: self.time_zone,
            extra_fields: self.extra_fields.clone(),
            keep_suffix: self.keep_suffix.clone(),
            size_scope: self.size_scope,
        })
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated, immutable view of a [`SinkConfig`].
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub(crate) log_dir: PathBuf,
    /// Retention only runs against a directory the user chose.
    pub(crate) sweepable: bool,
    pub(crate) file_name_suffix: String,
    pub(crate) default_log_name: String,
    pub(crate) error_separate: bool,
    pub(crate) errors_not_in_normal: bool,
    pub(crate) split: SplitMode,
    pub(crate) file_enabled: bool,
    pub(crate) console_enabled: bool,
    pub(crate) show_short_file_in_console: bool,
    pub(crate) show_func_in_console: bool,
    pub(crate) caller_enabled: bool,
    /// `None` when writes go straight to the file.
    pub(crate) buffer_size: Option<usize>,
    pub(crate) queue_capacity: usize,
    pub(crate) json: bool,
    pub(crate) colors: bool,
    pub(crate) timestamp_format: Option<String>,
    pub(crate) max_keep_days: u32,
    pub(crate) log_ext: String,
    pub(crate) level: Severity,
    pub(crate) time_zone: TimeZone,
    pub(crate) extra_fields: BTreeMap<String, Value>,
    pub(crate) keep_suffix: String,
    pub(crate) size_scope: SizeScope,
}

fn default_log_name() -> String {
    "default".to_string()
}

fn default_timestamp_format() -> String {
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]".to_string()
}

fn default_buffer_size() -> usize {
    4096
}

fn default_queue_capacity() -> usize {
    8192
}

fn default_format() -> String {
    "text".to_string()
}

fn default_log_ext() -> String {
    ".log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keep_suffix() -> String {
    "keep".to_string()
}
