//! Basic example: size-split files with a separate error file.
//!
//! This example demonstrates the simplest way to open a sink with the builder API
//! and route `tracing` events into it.
//!
//! Run with:
//! ```bash
//! cargo run --example basic
//! ```

use splitlog::DirectoryRegistry;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = DirectoryRegistry::new();

    let sink = splitlog::builder()
        .with_log_dir("./logs/basic")
        .with_max_log_size(64 * 1024)
        .with_error_separation(true, true)
        .with_key_value("service", "basic-demo")
        .with_level("debug")
        .init(&registry)?;

    tracing::debug!("This is a debug message");
    tracing::info!(user = "alice", "User logged in");
    tracing::warn!("This is a warning message");
    tracing::error!(code = 500, "This is an error message");

    println!("writing to {:?}", sink.current_log_path());
    sink.shutdown();
    Ok(())
}
