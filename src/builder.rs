//! Builder pattern for configuring and opening a sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use splitlog::DirectoryRegistry;
//!
//! let registry = DirectoryRegistry::new();
//! let sink = splitlog::builder()
//!     .with_log_dir("/var/log/my_app")
//!     .with_date_split(true)
//!     .with_error_separation(true, false)
//!     .with_max_keep_days(7)
//!     .open(&registry)
//!     .expect("Failed to open log sink");
//!
//! sink.handle(splitlog::LogEntry::new(splitlog::Severity::Info, "started"))
//!     .expect("Failed to write entry");
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{SizeScope, TimeZone};
use crate::format::EntryFormatter;
use crate::{DirectoryRegistry, FileSink, Result, SinkConfig, init_logging};

/// A fluent way to assemble a [`SinkConfig`] and open a [`FileSink`] from it.
///
/// The builder is also the place to plug in a custom formatter or console writer.
pub struct SinkBuilder {
    config: SinkConfig,
    formatter: Option<Box<dyn EntryFormatter>>,
    console: Option<Box<dyn Write + Send>>,
}

impl SinkBuilder {
    /// Create a new SinkBuilder with default configuration.
    pub fn new() -> Self {
        Self::from_config(SinkConfig::new())
    }

    /// Create a SinkBuilder from an existing configuration.
    pub fn from_config(config: SinkConfig) -> Self {
        Self {
            config,
            formatter: None,
            console: None,
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_log_dir(dir);
        self
    }

    /// Appended to every file name as `_<suffix>`.
    pub fn with_file_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config = self.config.with_file_name_suffix(suffix);
        self
    }

    /// Base name used when no split mode is active.
    pub fn with_default_log_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_default_log_name(name);
        self
    }

    pub fn with_error_separation(mut self, separate: bool, mirror: bool) -> Self {
        self.config = self.config.with_error_separation(separate, mirror);
        self
    }

    pub fn with_date_split(mut self, enabled: bool) -> Self {
        self.config = self.config.with_date_split(enabled);
        self
    }

    /// Split once a file reaches `bytes`. Zero disables size splitting.
    pub fn with_max_log_size(mut self, bytes: u64) -> Self {
        self.config = self.config.with_max_log_size(bytes);
        self
    }

    pub fn with_size_scope(mut self, scope: SizeScope) -> Self {
        self.config = self.config.with_size_scope(scope);
        self
    }

    pub fn with_file_disabled(mut self, disabled: bool) -> Self {
        self.config = self.config.with_file_disabled(disabled);
        self
    }

    /// Enable or disable console logging.
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config = self.config.with_console(enabled);
        self
    }

    pub fn with_write_buffer(mut self, enabled: bool) -> Self {
        self.config = self.config.with_write_buffer(enabled);
        self
    }

    pub fn with_write_buffer_size(mut self, bytes: usize) -> Self {
        self.config = self.config.with_write_buffer_size(bytes);
        self
    }

    /// Set the minimum severity (e.g., "trace", "debug", "info", "warn", "error").
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config = self.config.with_level(level);
        self
    }

    /// Set the output format ("text" or "json").
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.config = self.config.with_format(format);
        self
    }

    pub fn with_max_keep_days(mut self, days: u32) -> Self {
        self.config = self.config.with_max_keep_days(days);
        self
    }

    pub fn with_log_ext(mut self, ext: impl Into<String>) -> Self {
        self.config = self.config.with_log_ext(ext);
        self
    }

    pub fn with_time_zone(mut self, tz: TimeZone) -> Self {
        self.config = self.config.with_time_zone(tz);
        self
    }

    pub fn with_key_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config = self.config.with_key_value(key, value);
        self
    }

    pub fn with_caller(mut self, enabled: bool) -> Self {
        self.config = self.config.with_caller(enabled);
        self
    }

    /// Use a custom formatter for both file and console output.
    pub fn with_formatter(mut self, formatter: Box<dyn EntryFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Write the console view to `writer` instead of stdout.
    pub fn with_console_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.console = Some(writer);
        self
    }

    /// Get the current configuration without opening anything.
    pub fn build(self) -> SinkConfig {
        self.config
    }

    /// Open the sink and start its background threads.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Date and size splitting are both enabled
    /// - The log directory is already used by a sink in `registry`
    /// - The log files cannot be created
    pub fn open(self, registry: &DirectoryRegistry) -> Result<FileSink> {
        FileSink::open_with(&self.config, registry, self.formatter, self.console)
    }

    /// Open the sink and install it as the global `tracing` subscriber.
    ///
    /// Custom formatters and console writers are not used on this path.
    pub fn init(self, registry: &DirectoryRegistry) -> Result<Arc<FileSink>> {
        init_logging(&self.config, registry, None)
    }
}

impl Default for SinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkBuilder")
            .field("config", &self.config)
            .field("custom_formatter", &self.formatter.is_some())
            .field("custom_console", &self.console.is_some())
            .finish()
    }
}
