//! Example of loading the sink configuration from TOML.
//!
//! This example demonstrates how to deserialize a `SinkConfig` from a
//! configuration file section and initialize logging with it.
//!
//! Run with:
//! ```bash
//! cargo run --example config_toml
//! ```

use serde::Deserialize;

const CONFIG: &str = r#"
[log]
log_dir = "./logs/config_toml"
date_split = true
error_separate = true
errors_not_in_normal = true
format = "json"
level = "debug"
max_keep_days = 7
time_zone = "+08:00"

[log.extra_fields]
app = "config-demo"
"#;

#[derive(Deserialize)]
struct Config {
    log: splitlog::SinkConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse the TOML configuration
    let root: Config = toml::from_str(CONFIG)?;
    let registry = splitlog::DirectoryRegistry::new();

    // Initialize logging with the loaded configuration
    let sink = splitlog::init_logging(&root.log, &registry, None)?;

    tracing::trace!("This is a trace message (filtered out)");
    tracing::debug!("This is a debug message (visible because level is debug)");
    tracing::info!(
        user = "bob",
        action = "logout",
        duration_ms = 1234,
        "User session ended"
    );
    tracing::error!(error_code = 500, error_type = "database", "Database error occurred");

    sink.shutdown();
    Ok(())
}
