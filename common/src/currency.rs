//! Currency identifiers and display settings.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::CommonError;

/// ISO 4217 style currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a currency code, trimming and upper-casing the input.
    pub fn new(code: impl AsRef<str>) -> Result<Self, CommonError> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(CommonError::EmptyCurrencyCode);
        }
        Ok(Self(code.to_uppercase()))
    }

    /// Get the currency code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn idr() -> Self {
        Self("IDR".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn jpy() -> Self {
        Self("JPY".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CurrencyCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = CommonError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl PartialEq<str> for CurrencyCode {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CurrencyCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How a currency is shown to the user.
///
/// Unknown fields are rejected when deserializing, so a partial override
/// object cannot silently carry extra keys into the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurrencySettings {
    /// Currency identifier.
    pub code: CurrencyCode,
    /// Display glyph, e.g. `Rp` or `$`.
    pub symbol: String,
    /// Formatting locale tag, e.g. `id-ID`.
    pub locale: String,
}

impl CurrencySettings {
    /// Create new currency settings.
    pub fn new(code: CurrencyCode, symbol: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            code,
            symbol: symbol.into(),
            locale: locale.into(),
        }
    }

    pub fn idr() -> Self {
        Self::new(CurrencyCode::idr(), "Rp", "id-ID")
    }

    pub fn usd() -> Self {
        Self::new(CurrencyCode::usd(), "$", "en-US")
    }

    pub fn eur() -> Self {
        Self::new(CurrencyCode::eur(), "€", "de-DE")
    }
}

impl fmt::Display for CurrencySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.code, self.symbol, self.locale)
    }
}

/// The set of currencies offered for display, keyed by unique code.
pub fn default_offered_currencies() -> Vec<CurrencySettings> {
    let entry = |code: &str, symbol: &str, locale: &str| {
        CurrencySettings::new(CurrencyCode(code.to_string()), symbol, locale)
    };

    vec![
        entry("IDR", "Rp", "id-ID"),
        entry("USD", "$", "en-US"),
        entry("EUR", "€", "de-DE"),
        entry("GBP", "£", "en-GB"),
        entry("JPY", "¥", "ja-JP"),
        entry("SGD", "S$", "en-SG"),
        entry("MYR", "RM", "ms-MY"),
        entry("AUD", "A$", "en-AU"),
        entry("CNY", "¥", "zh-CN"),
        entry("KRW", "₩", "ko-KR"),
        entry("THB", "฿", "th-TH"),
        entry("VND", "₫", "vi-VN"),
        entry("PHP", "₱", "en-PH"),
        entry("INR", "₹", "en-IN"),
        entry("CAD", "C$", "en-CA"),
    ]
}
