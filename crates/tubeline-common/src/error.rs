//! Error types for Tubeline

use thiserror::Error;

/// Result type alias for Tubeline operations
pub type Result<T> = std::result::Result<T, TubelineError>;

/// Shared error type for Tubeline
#[derive(Error, Debug)]
pub enum TubelineError {
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),
}
