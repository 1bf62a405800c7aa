//! Exchange rate snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::currency::CurrencyCode;
use crate::error::CommonError;

/// One fetched set of exchange rates anchored to a single base currency.
///
/// Every stored rate is finite and strictly positive. The base currency is
/// never stored in `rates`; its rate is implicitly 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotPayload", into = "SnapshotPayload")]
pub struct ExchangeRateSnapshot {
    base: CurrencyCode,
    rates: HashMap<CurrencyCode, f64>,
    fetched_at: DateTime<Utc>,
    is_fallback: bool,
}

impl ExchangeRateSnapshot {
    /// Build a snapshot, rejecting non-positive or non-finite rates.
    pub fn validated(
        base: CurrencyCode,
        rates: HashMap<CurrencyCode, f64>,
        fetched_at: DateTime<Utc>,
        is_fallback: bool,
    ) -> Result<Self, CommonError> {
        let mut checked = HashMap::with_capacity(rates.len());
        for (code, rate) in rates {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(CommonError::InvalidRate {
                    code: code.to_string(),
                    rate,
                });
            }
            if code == base {
                if (rate - 1.0).abs() > f64::EPSILON {
                    return Err(CommonError::InvalidRate {
                        code: code.to_string(),
                        rate,
                    });
                }
                continue;
            }
            checked.insert(code, rate);
        }

        Ok(Self {
            base,
            rates: checked,
            fetched_at,
            is_fallback,
        })
    }

    /// Base currency all rates are relative to.
    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// Stored rates, excluding the base.
    pub fn rates(&self) -> &HashMap<CurrencyCode, f64> {
        &self.rates
    }

    /// Rate of `code` relative to the base; the base itself resolves to 1.
    pub fn rate(&self, code: &str) -> Option<f64> {
        if self.base == code {
            return Some(1.0);
        }
        self.rates.get(code).copied()
    }

    /// Whether the snapshot carries a rate for `code` (the base always does).
    pub fn contains(&self, code: &str) -> bool {
        self.rate(code).is_some()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Whether the provider flagged this data as its own fallback.
    pub fn is_fallback(&self) -> bool {
        self.is_fallback
    }
}

/// Wire and persisted shape of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub base: String,
    pub rates: HashMap<String, f64>,
    #[serde(rename = "fetchedAtUtc")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl TryFrom<SnapshotPayload> for ExchangeRateSnapshot {
    type Error = CommonError;

    fn try_from(payload: SnapshotPayload) -> Result<Self, Self::Error> {
        let base = CurrencyCode::new(&payload.base)?;
        let mut rates = HashMap::with_capacity(payload.rates.len());
        for (code, rate) in payload.rates {
            rates.insert(CurrencyCode::new(code)?, rate);
        }
        Self::validated(base, rates, payload.fetched_at, payload.is_fallback)
    }
}

impl From<ExchangeRateSnapshot> for SnapshotPayload {
    fn from(snapshot: ExchangeRateSnapshot) -> Self {
        Self {
            base: snapshot.base.into(),
            rates: snapshot
                .rates
                .into_iter()
                .map(|(code, rate)| (code.into(), rate))
                .collect(),
            fetched_at: snapshot.fetched_at,
            is_fallback: snapshot.is_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(entries: &[(&str, f64)]) -> HashMap<CurrencyCode, f64> {
        entries
            .iter()
            .map(|(code, rate)| (CurrencyCode::new(code).unwrap(), *rate))
            .collect()
    }

    #[test]
    fn test_base_rate_is_implicit() {
        let snapshot = ExchangeRateSnapshot::validated(
            CurrencyCode::usd(),
            rates(&[("IDR", 15800.0), ("USD", 1.0)]),
            Utc::now(),
            false,
        )
        .unwrap();

        assert_eq!(snapshot.rate("USD"), Some(1.0));
        assert_eq!(snapshot.rate("IDR"), Some(15800.0));
        assert_eq!(snapshot.rates().len(), 1);
        assert!(!snapshot.contains("EUR"));
    }

    #[test]
    fn test_rejects_non_positive_rates() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = ExchangeRateSnapshot::validated(
                CurrencyCode::usd(),
                rates(&[("EUR", bad)]),
                Utc::now(),
                false,
            );
            assert!(matches!(result, Err(CommonError::InvalidRate { .. })));
        }
    }

    #[test]
    fn test_payload_deserialization() {
        let json = r#"{
            "base": "usd",
            "rates": {"idr": 15800, "EUR": 0.92},
            "fetchedAtUtc": "2024-05-01T10:00:00Z",
            "isFallback": true
        }"#;

        let snapshot: ExchangeRateSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.base(), &CurrencyCode::usd());
        assert_eq!(snapshot.rate("IDR"), Some(15800.0));
        assert!(snapshot.is_fallback());
    }

    #[test]
    fn test_payload_with_zero_rate_rejected() {
        let json = r#"{"base":"USD","rates":{"EUR":0},"fetchedAtUtc":"2024-05-01T10:00:00Z"}"#;
        assert!(serde_json::from_str::<ExchangeRateSnapshot>(json).is_err());
    }
}
