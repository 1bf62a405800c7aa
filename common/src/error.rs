//! Error types for shared currency values.

use thiserror::Error;

/// Errors raised while constructing shared currency values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommonError {
    /// Currency code was empty after trimming.
    #[error("Currency code cannot be empty")]
    EmptyCurrencyCode,

    /// Rate is not a finite positive number.
    #[error("Invalid rate {rate} for {code}")]
    InvalidRate { code: String, rate: f64 },
}

/// Result type alias for shared value construction.
pub type Result<T> = std::result::Result<T, CommonError>;
