//! Rate computation and amount conversion.
//!
//! Everything here is a pure function of its inputs. The snapshot is passed
//! in by the caller; when none is available the static fallback table is
//! used with the same rules. No lookup ever fails: a pair that cannot be
//! resolved converts at 1.

use chrono::{TimeZone, Utc};
use pricefx_common::{normalize_amount, CurrencyCode, ExchangeRateSnapshot};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Anchor currency of the static fallback table.
pub const FALLBACK_ANCHOR: &str = "USD";

const FALLBACK_RATES: &[(&str, f64)] = &[
    ("IDR", 15800.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("SGD", 1.34),
    ("MYR", 4.47),
    ("AUD", 1.52),
    ("CNY", 7.24),
    ("KRW", 1330.0),
    ("THB", 35.6),
    ("VND", 24500.0),
    ("PHP", 56.2),
    ("INR", 83.1),
    ("CAD", 1.36),
];

/// The static fallback table, anchored to [`FALLBACK_ANCHOR`].
pub fn fallback_table() -> &'static ExchangeRateSnapshot {
    static TABLE: OnceLock<ExchangeRateSnapshot> = OnceLock::new();
    TABLE.get_or_init(|| {
        let rates: HashMap<CurrencyCode, f64> = FALLBACK_RATES
            .iter()
            .filter_map(|(code, rate)| CurrencyCode::new(code).ok().map(|c| (c, *rate)))
            .collect();
        let anchor = CurrencyCode::usd();
        let fetched_at = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);

        ExchangeRateSnapshot::validated(anchor, rates, fetched_at, true)
            .expect("static fallback rates are finite and positive")
    })
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Same currency on both sides.
    Identity,
    /// Live (possibly stale) snapshot.
    Live,
    /// Static fallback table.
    Fallback,
    /// Pair could not be resolved; rate defined as 1.
    PassThrough,
}

impl RateOrigin {
    /// Whether the rate is a lossy stand-in rather than market data.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RateOrigin::PassThrough)
    }
}

/// A resolved rate with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    pub rate: f64,
    pub origin: RateOrigin,
}

/// Resolve the rate for `from → to`.
///
/// With `b` the snapshot base and `r(x)` the stored rate of `x` (where
/// `r(b) = 1`), the rate is `r(to) / r(from)`. This covers direct quotes
/// from the base, inverse quotes into the base and the single cross hop
/// through the base.
///
/// Codes are matched after trimming and upper-casing, so `"usd"` and
/// `"USD"` resolve alike. Empty codes pass through.
pub fn resolve_rate(from: &str, to: &str, snapshot: Option<&ExchangeRateSnapshot>) -> RateQuote {
    let (Ok(from), Ok(to)) = (CurrencyCode::new(from), CurrencyCode::new(to)) else {
        debug!(
            target: "pricefx::degraded",
            from = %from,
            to = %to,
            "Empty currency code, passing amount through"
        );
        return RateQuote {
            rate: 1.0,
            origin: RateOrigin::PassThrough,
        };
    };

    if from == to {
        return RateQuote {
            rate: 1.0,
            origin: RateOrigin::Identity,
        };
    }

    let (table, origin) = match snapshot {
        Some(snapshot) => (snapshot, RateOrigin::Live),
        None => (fallback_table(), RateOrigin::Fallback),
    };

    match (table.rate(from.as_str()), table.rate(to.as_str())) {
        (Some(from_rate), Some(to_rate)) => RateQuote {
            rate: if table.base() == &from {
                to_rate
            } else if table.base() == &to {
                1.0 / from_rate
            } else {
                to_rate / from_rate
            },
            origin,
        },
        _ => {
            debug!(
                target: "pricefx::degraded",
                from = %from,
                to = %to,
                base = %table.base(),
                "No rate for pair, passing amount through"
            );
            RateQuote {
                rate: 1.0,
                origin: RateOrigin::PassThrough,
            }
        }
    }
}

/// Rate for `from → to`. Never fails; unresolvable pairs yield 1.
pub fn get_rate(from: &str, to: &str, snapshot: Option<&ExchangeRateSnapshot>) -> f64 {
    resolve_rate(from, to, snapshot).rate
}

/// Convert `amount` from one currency to another without rounding.
///
/// NaN and infinite amounts are treated as 0; sign and zero pass through.
pub fn convert(amount: f64, from: &str, to: &str, snapshot: Option<&ExchangeRateSnapshot>) -> f64 {
    normalize_amount(amount) * get_rate(from, to, snapshot)
}

/// A single conversion with its inputs, as handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub amount: f64,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new(amount: f64, from: CurrencyCode, to: CurrencyCode) -> Self {
        Self { amount, from, to }
    }

    /// Run the conversion against `snapshot` (or the fallback table).
    pub fn execute(&self, snapshot: Option<&ExchangeRateSnapshot>) -> Conversion {
        let quote = resolve_rate(self.from.as_str(), self.to.as_str(), snapshot);
        Conversion {
            input: normalize_amount(self.amount),
            output: normalize_amount(self.amount) * quote.rate,
            quote,
        }
    }
}

/// Result of a conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub input: f64,
    pub output: f64,
    pub quote: RateQuote,
}
