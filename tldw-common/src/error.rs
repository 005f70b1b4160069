//! Common error types for tldw

use thiserror::Error;

/// Common result type for tldw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across tldw services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (including programming errors such as unknown stage names)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
