use thiserror::Error as ThisError;

/// Errors that can occur in the log sink
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid, or the log directory is already bound to another sink.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),
    /// An entry could not be turned into bytes.
    #[error("Format error: {0}")]
    Format(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Time format error: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Invalid time format description: {0}")]
    FormatDescription(#[from] time::error::InvalidFormatDescription),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
