//! The log sink: metadata, formatting, routing to files and the console.

use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use crate::buffer::BufferedSink;
use crate::color::strip_ansi_owned;
use crate::config::ResolvedConfig;
use crate::entry::{FILE_FIELD, FUNC_FIELD, short_file_name, short_function_name};
use crate::format::{EntryFormatter, JsonFormatter, TextFormatter};
use crate::output::FileOutput;
use crate::retention::{RetentionTask, SWEEP_INTERVAL, SweepReport};
use crate::{DirectoryRegistry, Error, LogEntry, Result, SinkConfig};

#[derive(Default)]
struct Workers {
    flusher: Option<BufferedSink>,
    retention: Option<RetentionTask>,
    console_guard: Option<WorkerGuard>,
}

/// A configured sink. Safe to share between any number of producer threads.
///
/// Dropping the sink (or calling [`FileSink::shutdown`]) stops its background
/// threads and writes out anything still buffered.
pub struct FileSink {
    config: Arc<ResolvedConfig>,
    formatter: Box<dyn EntryFormatter>,
    output: Option<Arc<FileOutput>>,
    /// Normalized directory this sink holds in its registry.
    claimed: Option<PathBuf>,
    console: Option<Mutex<Box<dyn Write + Send>>>,
    workers: Mutex<Workers>,
}

impl FileSink {
    /// Open a sink with the default formatter and a non-blocking stdout console.
    pub fn open(config: &SinkConfig, registry: &DirectoryRegistry) -> Result<Self> {
        Self::open_with(config, registry, None, None)
    }

    pub(crate) fn open_with(
        config: &SinkConfig,
        registry: &DirectoryRegistry,
        formatter: Option<Box<dyn EntryFormatter>>,
        console: Option<Box<dyn Write + Send>>,
    ) -> Result<Self> {
        let config = Arc::new(config.resolve()?);
        let formatter = match formatter {
            Some(formatter) => formatter,
            None if config.json => Box::new(JsonFormatter::new(config.timestamp_format.as_deref())?),
            None => Box::new(TextFormatter::new(config.timestamp_format.as_deref())?),
        };

        let mut workers = Workers::default();
        let (output, claimed) = if config.file_enabled {
            let claimed = registry.claim(&config.log_dir)?;
            match start_file_output(&config, &mut workers) {
                Ok(output) => (Some(output), Some(claimed)),
                Err(e) => {
                    registry.release(&claimed);
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        let console = if config.console_enabled {
            Some(Mutex::new(console.unwrap_or_else(|| {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                workers.console_guard = Some(guard);
                Box::new(writer)
            })))
        } else {
            None
        };

        if let Some(output) = &output {
            tracing::debug!(
                "log sink writing to {}",
                output
                    .normal_path()
                    .unwrap_or_default()
                    .display()
            );
        }

        Ok(Self {
            config,
            formatter,
            output,
            claimed,
            console,
            workers: Mutex::new(workers),
        })
    }

    /// Write one entry. Failures are reported on stderr and returned; they never panic.
    pub fn handle(&self, mut entry: LogEntry) -> Result<()> {
        if entry.severity < self.config.level {
            return Ok(());
        }
        self.attach_metadata(&mut entry);

        let mut result = Ok(());
        if let Some(output) = &self.output {
            result = self.write_file(output, &entry);
        }

        if let Some(console) = &self.console {
            if !self.config.show_short_file_in_console {
                entry.fields.remove(FILE_FIELD);
            }
            if !self.config.show_func_in_console {
                entry.fields.remove(FUNC_FIELD);
            }
            match self.formatter.format(&entry, self.config.colors) {
                Ok(line) => {
                    if let Err(e) = console.lock().write_all(&line) {
                        eprintln!("splitlog: console write failed: {}", e);
                    }
                }
                Err(e) => eprintln!("splitlog: format failed: {}", e),
            }
        }
        result
    }

    fn attach_metadata(&self, entry: &mut LogEntry) {
        entry.timestamp = entry
            .timestamp
            .to_offset(self.config.time_zone.now().offset());
        for (key, value) in &self.config.extra_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        if self.config.caller_enabled
            && let Some(caller) = &entry.caller
        {
            let file = short_file_name(&caller.file, caller.line);
            let function = caller
                .function
                .as_deref()
                .map(|f| short_function_name(f).to_string());
            entry.fields.insert(FILE_FIELD.to_string(), file.into());
            if let Some(function) = function {
                entry.fields.insert(FUNC_FIELD.to_string(), function.into());
            }
        }
    }

    fn write_file(&self, output: &FileOutput, entry: &LogEntry) -> Result<()> {
        let line = self
            .formatter
            .format(entry, self.config.colors)
            .map_err(|e| {
                eprintln!("splitlog: format failed, entry dropped: {}", e);
                Error::Format(e.to_string())
            })?;
        output
            .write_line(entry.severity, strip_ansi_owned(line))
            .map_err(|e| {
                eprintln!("splitlog: write log file failed: {}", e);
                Error::Io(e)
            })
    }

    /// Write out buffered lines now.
    pub fn flush(&self) -> Result<()> {
        if let Some(output) = &self.output {
            output.sync_flush()?;
        }
        if let Some(console) = &self.console {
            console.lock().flush()?;
        }
        Ok(())
    }

    /// Delete log data older than `max_age_days`. Zero or less deletes everything
    /// except keep-marked entries and reopens fresh files.
    ///
    /// Does nothing unless the sink writes files into an explicitly configured directory.
    pub fn sweep(&self, max_age_days: i64) -> Result<SweepReport> {
        match &self.output {
            Some(output) if self.config.sweepable => Ok(output.sweep(max_age_days)),
            _ => Ok(SweepReport::default()),
        }
    }

    /// Stop the background threads and flush. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        if let Some(mut retention) = workers.retention.take() {
            retention.stop();
        }
        if let Some(mut flusher) = workers.flusher.take() {
            flusher.shutdown();
        }
        if let Some(output) = &self.output
            && let Err(e) = output.sync_flush()
        {
            eprintln!("splitlog: final flush failed: {}", e);
        }
        if let Some(console) = &self.console
            && let Err(e) = console.lock().flush()
        {
            eprintln!("splitlog: final console flush failed: {}", e);
        }
        workers.console_guard.take();
    }

    /// Bytes counted toward the size-split threshold since the current file opened.
    pub fn accumulated_size(&self) -> u64 {
        self.output
            .as_ref()
            .map_or(0, |output| output.accumulated_size())
    }

    /// Path of the normal log file currently written to.
    pub fn current_log_path(&self) -> Option<PathBuf> {
        self.output.as_ref().and_then(|output| output.normal_path())
    }

    /// Path of the error file for the current slot, whether or not it exists yet.
    pub fn current_error_path(&self) -> Option<PathBuf> {
        self.output.as_ref().and_then(|output| output.error_path())
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    pub(crate) fn claimed_dir(&self) -> Option<&Path> {
        self.claimed.as_deref()
    }
}

fn start_file_output(config: &Arc<ResolvedConfig>, workers: &mut Workers) -> Result<Arc<FileOutput>> {
    let output = Arc::new(FileOutput::open(Arc::clone(config))?);

    if let Some(queue) = output.queue() {
        let flusher_output = Arc::clone(&output);
        workers.flusher = Some(BufferedSink::spawn(Arc::clone(queue), move |queue| {
            flusher_output.drain(queue)
        })?);
    }

    if config.sweepable && config.max_keep_days > 0 {
        let days = i64::from(config.max_keep_days);
        let sweep_output = Arc::clone(&output);
        workers.retention = Some(RetentionTask::spawn(SWEEP_INTERVAL, move || {
            let report = sweep_output.sweep(days);
            if !report.is_empty() {
                tracing::info!(
                    "removed {} expired log files and {} folders",
                    report.removed_files.len(),
                    report.removed_dirs.len()
                );
            }
        })?);
    }
    Ok(output)
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("log_dir", &self.config.log_dir)
            .field("file", &self.output.is_some())
            .field("console", &self.console.is_some())
            .finish()
    }
}
