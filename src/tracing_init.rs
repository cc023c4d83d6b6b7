use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{DirectoryRegistry, Error, FileSink, LogEntry, Result, Severity, SinkConfig};

/// A `tracing` layer that hands every event to a [`FileSink`].
#[derive(Debug, Clone)]
pub struct SinkLayer {
    sink: Arc<FileSink>,
}

impl SinkLayer {
    pub fn new(sink: Arc<FileSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<FileSink> {
        &self.sink
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, Value>,
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, Value::from(format!("{:?}", value)));
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut entry = LogEntry::new(Severity::from(meta.level()), visitor.message);
        entry.fields = visitor.fields;
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            // `tracing` records no function name; the module path stands in for it.
            entry = entry.with_caller(file, line, meta.module_path());
        }
        // Failures were already reported on stderr.
        let _ = self.sink.handle(entry);
    }
}

/// Open a sink for `config` and install it as the global `tracing` subscriber.
///
/// Level filtering happens in the installed `EnvFilter`: `RUST_LOG` wins, then the
/// CLI verbosity, then the configured level.
pub fn init_logging(
    config: &SinkConfig,
    registry: &DirectoryRegistry,
    cli_verbose: Option<u8>,
) -> Result<Arc<FileSink>> {
    let log_spec = effective_log_spec(config, cli_verbose);
    let env_filter = EnvFilter::try_new(&log_spec).map_err(|e| Error::Init(e.to_string()))?;

    let sink_config = config.clone().with_level(Severity::Trace.as_str());
    let sink = Arc::new(FileSink::open(&sink_config, registry)?);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(SinkLayer::new(Arc::clone(&sink)))
        .try_init()
    {
        if let Some(dir) = sink.claimed_dir() {
            registry.release(dir);
        }
        return Err(Error::Init(e.to_string()));
    }

    Ok(sink)
}

/// Determine the effective filter directive, considering config and CLI overrides.
fn effective_log_spec(config: &SinkConfig, cli_verbose: Option<u8>) -> String {
    // RUST_LOG takes precedence over everything
    if let Ok(rust_log) = std::env::var("RUST_LOG")
        && !rust_log.is_empty()
    {
        return rust_log;
    }

    let configured = Severity::parse_lenient(&config.level).filter_directive();
    match cli_verbose {
        None | Some(0) => configured.to_string(),
        Some(1) => "debug".to_string(),
        Some(_) => "trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_log_spec_precedence() {
        let prev = std::env::var_os("RUST_LOG");
        let cfg = SinkConfig::new().with_level("warn");

        unsafe {
            std::env::set_var("RUST_LOG", "");
        }
        assert_eq!(effective_log_spec(&cfg, None), "warn");
        assert_eq!(effective_log_spec(&cfg, Some(0)), "warn");
        assert_eq!(effective_log_spec(&cfg, Some(1)), "debug");
        assert_eq!(effective_log_spec(&cfg, Some(5)), "trace");
        assert_eq!(
            effective_log_spec(&SinkConfig::new().with_level("fatal"), None),
            "error"
        );
        assert_eq!(
            effective_log_spec(&SinkConfig::new().with_level("nonsense"), None),
            "info"
        );

        unsafe {
            std::env::set_var("RUST_LOG", "my_app=trace");
        }
        assert_eq!(effective_log_spec(&cfg, Some(1)), "my_app=trace");

        unsafe {
            match prev {
                Some(v) => std::env::set_var("RUST_LOG", v),
                None => std::env::remove_var("RUST_LOG"),
            }
        }
    }

    #[test]
    fn test_layer_forwards_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SinkConfig::new()
            .with_log_dir(dir.path())
            .with_console(false)
            .with_level("debug");
        config.no_timestamp = true;
        config.disable_colors = true;
        let sink = Arc::new(FileSink::open(&config, &DirectoryRegistry::new()).unwrap());

        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(Arc::clone(&sink)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!("filtered by the sink level");
            tracing::info!(user = "bob", attempts = 3, "login {}", "ok");
            tracing::error!(code = 500, "request failed");
        });
        sink.shutdown();

        let content = std::fs::read_to_string(dir.path().join("default.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("INFO login ok FILE="));
        assert!(lines[0].contains("attempts=3 user=bob"));
        assert!(lines[0].contains("FILE=\"tracing_init.rs:"));
        assert!(lines[0].contains("FUNC=tests"));
        assert!(lines[1].starts_with("ERRO request failed "));
        assert!(lines[1].ends_with("code=500"));
    }
}
