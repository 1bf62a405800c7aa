//! FX subsystem error types.
//!
//! None of these escape the conversion or formatting paths: fetch and parse
//! failures are recorded by the cache and surfaced only as freshness flags.

use pricefx_common::{CommonError, CurrencyCode};
use thiserror::Error;

/// Errors produced while obtaining exchange rates.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Network or provider error.
    #[error("Rate fetch failed: {0}")]
    Fetch(String),

    /// Provider did not answer within the configured timeout.
    #[error("Rate fetch timed out after {0} ms")]
    Timeout(u64),

    /// Provider payload could not be decoded.
    #[error("Malformed rate payload: {0}")]
    Parse(String),

    /// Provider payload decoded but violated snapshot invariants.
    #[error("Invalid rate snapshot: {0}")]
    InvalidSnapshot(#[from] CommonError),

    /// Provider returned a snapshot anchored to a different currency.
    #[error("Anchor mismatch: requested {requested}, got {actual}")]
    AnchorMismatch {
        requested: CurrencyCode,
        actual: CurrencyCode,
    },
}

impl FxError {
    /// Whether the failure came from decoding rather than transport.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            FxError::Parse(_) | FxError::InvalidSnapshot(_) | FxError::AnchorMismatch { .. }
        )
    }
}

impl From<reqwest::Error> for FxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FxError::Parse(err.to_string())
        } else {
            FxError::Fetch(err.to_string())
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

/// Errors raised by the settings store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// Currency is not part of the offered set.
    #[error("Currency {0} is not offered")]
    UnsupportedCurrency(String),

    /// Display symbol was empty.
    #[error("Currency {0} has an empty symbol")]
    EmptySymbol(CurrencyCode),

    /// Offered set contains the same code twice.
    #[error("Currency {0} is offered more than once")]
    DuplicateCurrency(CurrencyCode),
}

/// Errors raised while loading or saving persisted state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid state key: {0}")]
    InvalidKey(String),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
