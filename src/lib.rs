//! # Splitlog
//!
//! A log sink that writes entries from many threads into rotating files and a console.
//!
//! ## Features
//!
//! - Date or size based file splitting, resuming into undersized files on restart
//! - Error-and-above entries in a separate, lazily created file
//! - Buffered writes drained by a background flusher, flushed synchronously on fatal entries
//! - Retention sweeps of expired files and date folders, with a "keep" marker
//! - Integration with the `tracing` ecosystem
//!
//! ## Example
//!
//! ```rust,no_run
//! use splitlog::{DirectoryRegistry, SinkConfig, init_logging};
//!
//! let registry = DirectoryRegistry::new();
//! let config = SinkConfig::new()
//!     .with_log_dir("./logs")
//!     .with_max_log_size(10 * 1024 * 1024);
//! let _sink = init_logging(&config, &registry, None)?;
//!
//! tracing::info!("This is an info message");
//! # Ok::<(), splitlog::Error>(())
//! ```

pub mod builder;
pub mod color;
pub mod config;
pub mod entry;
pub mod error;
pub mod format;
pub mod level;
pub mod registry;
pub mod retention;
pub mod rotation;
pub mod sink;
pub mod tracing_init;

mod buffer;
mod lazy_file;
mod output;
mod resolver;
mod writer;

pub use builder::SinkBuilder;
pub use color::strip_ansi;
pub use config::{SinkConfig, SizeScope, TimeZone};
pub use entry::{Caller, LogEntry};
pub use error::{Error, Result};
pub use format::{EntryFormatter, JsonFormatter, TextFormatter};
pub use lazy_file::LazyFile;
pub use level::Severity;
pub use registry::DirectoryRegistry;
pub use resolver::make_file_name_legal;
pub use retention::SweepReport;
pub use rotation::{SplitDecision, SplitMode, SplitPolicy};
pub use sink::FileSink;
pub use tracing_init::{SinkLayer, init_logging};

/// Create a new [`SinkBuilder`] with default configuration.
pub fn builder() -> SinkBuilder {
    SinkBuilder::new()
}
