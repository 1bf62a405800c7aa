//! Price formatting and parsing.

use pricefx_common::{normalize_amount, CurrencyCode, CurrencySettings};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::locale::{self, Grouping, LocaleFormat, SymbolPosition};

/// Largest decimal count a formatted price may carry.
pub const MAX_DECIMALS: u32 = 12;

/// Currencies displayed without minor units by default.
pub fn default_no_decimal_currencies() -> Vec<CurrencyCode> {
    ["IDR", "JPY", "KRW", "VND"]
        .iter()
        .filter_map(|code| CurrencyCode::new(code).ok())
        .collect()
}

/// Per-call formatting overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Explicit number of decimals, overriding the currency policy.
    pub decimals: Option<u32>,
}

impl FormatOptions {
    pub fn with_decimals(decimals: u32) -> Self {
        Self {
            decimals: Some(decimals),
        }
    }
}

/// Why locale-aware formatting was not possible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("Unsupported locale: {0}")]
    UnsupportedLocale(String),

    #[error("Amount {0} is outside the formattable range")]
    OutOfRange(f64),

    #[error("Unsupported decimal count: {0}")]
    UnsupportedDecimals(u32),
}

/// Turns amounts into display strings and back.
#[derive(Debug, Clone)]
pub struct Formatter {
    no_decimal: HashSet<CurrencyCode>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(default_no_decimal_currencies())
    }
}

impl Formatter {
    /// Create a formatter with the given no-decimal currency set.
    pub fn new(no_decimal: impl IntoIterator<Item = CurrencyCode>) -> Self {
        Self {
            no_decimal: no_decimal.into_iter().collect(),
        }
    }

    /// Decimal places used for `code` when no override is given.
    pub fn decimals_for(&self, code: &CurrencyCode) -> u32 {
        if self.no_decimal.contains(code) {
            0
        } else {
            2
        }
    }

    /// Format `amount` with the currency's default decimal policy.
    pub fn format(&self, amount: f64, settings: &CurrencySettings) -> String {
        self.format_with(amount, settings, FormatOptions::default())
    }

    /// Format `amount`. Never fails: when the locale cannot be used the
    /// result is the symbol followed by the grouped integer part.
    pub fn format_with(
        &self,
        amount: f64,
        settings: &CurrencySettings,
        options: FormatOptions,
    ) -> String {
        let amount = normalize_amount(amount);
        let decimals = options
            .decimals
            .unwrap_or_else(|| self.decimals_for(&settings.code));

        match format_localized(amount, decimals, settings) {
            Ok(formatted) => formatted,
            Err(e) => {
                debug!(
                    error = %e,
                    currency = %settings.code,
                    locale = %settings.locale,
                    "Falling back to plain price format"
                );
                format_plain(amount, &settings.symbol)
            }
        }
    }

    /// Short form for large amounts: `Rp1.5M`. Below 1,000 this is the
    /// same as [`Formatter::format`].
    ///
    /// The suffix is chosen after rounding to one decimal, so 999,950 is
    /// `1.0M` rather than `1000.0K`.
    pub fn compact(&self, amount: f64, settings: &CurrencySettings) -> String {
        let amount = normalize_amount(amount);
        let magnitude = amount.abs();

        let Some(mut tier) = COMPACT_TIERS
            .iter()
            .position(|(divisor, _)| magnitude >= *divisor as f64)
        else {
            return self.format(amount, settings);
        };

        let sign = if amount < 0.0 { "-" } else { "" };
        let Some(value) = Decimal::from_f64(magnitude) else {
            let (divisor, suffix) = COMPACT_TIERS[tier];
            return format!("{sign}{}{:.1}{suffix}", settings.symbol, magnitude / divisor as f64);
        };

        let mut scaled = compact_scale(value, COMPACT_TIERS[tier].0);
        if tier > 0 && scaled >= Decimal::from(1000) {
            tier -= 1;
            scaled = compact_scale(value, COMPACT_TIERS[tier].0);
        }

        format!("{sign}{}{scaled:.1}{}", settings.symbol, COMPACT_TIERS[tier].1)
    }

    /// Parse a display string back into a number. Returns 0 for anything
    /// that does not contain a valid number.
    pub fn parse(&self, text: &str) -> f64 {
        parse_amount(text, None)
    }

    /// Parse using `locale` to disambiguate a lone separator.
    pub fn parse_with_locale(&self, text: &str, locale: &str) -> f64 {
        parse_amount(text, locale::lookup(locale).map(|l| l.decimal))
    }
}

/// Round half away from zero to `decimals` places.
///
/// `None` when the amount does not fit a `Decimal`.
pub fn round_for_display(amount: f64, decimals: u32) -> Option<Decimal> {
    Decimal::from_f64(amount)
        .map(|value| value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
}

/// Compact suffixes, largest first.
const COMPACT_TIERS: [(u64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

fn compact_scale(value: Decimal, divisor: u64) -> Decimal {
    (value / Decimal::from(divisor))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

fn format_localized(
    amount: f64,
    decimals: u32,
    settings: &CurrencySettings,
) -> Result<String, FormatError> {
    let locale = locale::lookup(&settings.locale)
        .ok_or_else(|| FormatError::UnsupportedLocale(settings.locale.clone()))?;
    if decimals > MAX_DECIMALS {
        return Err(FormatError::UnsupportedDecimals(decimals));
    }

    let rounded = round_for_display(amount, decimals).ok_or(FormatError::OutOfRange(amount))?;
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let digits = rounded.abs().to_string();
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

    let mut number = locale::group_digits(int_part, locale.group, locale.grouping);
    if decimals > 0 {
        number.push(locale.decimal);
        number.push_str(frac_part);
        for _ in frac_part.len()..decimals as usize {
            number.push('0');
        }
    }

    Ok(place_symbol(number, negative, &settings.symbol, locale))
}

fn place_symbol(number: String, negative: bool, symbol: &str, locale: &LocaleFormat) -> String {
    let sign = if negative { "-" } else { "" };
    let space = if locale.symbol_space { " " } else { "" };
    match locale.symbol_position {
        SymbolPosition::Prefix => format!("{sign}{symbol}{space}{number}"),
        SymbolPosition::Suffix => format!("{sign}{number}{space}{symbol}"),
    }
}

/// `symbol + grouped integer`, used when the locale path fails.
fn format_plain(amount: f64, symbol: &str) -> String {
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());
    format!(
        "{sign}{symbol}{}",
        locale::group_digits(&digits, ',', Grouping::Thousands)
    )
}

fn parse_amount(text: &str, decimal_hint: Option<char>) -> f64 {
    let negative = text
        .chars()
        .take_while(|c| !c.is_ascii_digit())
        .any(|c| c == '-');

    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let Some(normalized) = resolve_separators(&kept, decimal_hint) else {
        return 0.0;
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if negative {
                -value
            } else {
                value
            }
        }
        _ => 0.0,
    }
}

/// Rewrite digits plus `.`/`,` into a plain `1234.56` string.
///
/// With both separators present the last one is the decimal mark. A
/// separator appearing more than once is grouping. A lone separator is the
/// decimal mark when it matches the locale hint; otherwise it is grouping
/// only when exactly three digits follow it.
fn resolve_separators(text: &str, decimal_hint: Option<char>) -> Option<String> {
    let dots = text.matches('.').count();
    let commas = text.matches(',').count();

    let decimal = match (dots, commas) {
        (0, 0) => None,
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let count = dots.max(commas);
            if count > 1 {
                None
            } else {
                let trailing = text.rsplit(sep).next().map_or(0, str::len);
                match decimal_hint {
                    Some(hint) if hint == sep => Some(sep),
                    _ => (trailing != 3).then_some(sep),
                }
            }
        }
        _ => text.chars().rev().find(|c| *c == '.' || *c == ','),
    };

    match decimal {
        Some(mark) => {
            if text.matches(mark).count() > 1 {
                return None;
            }
            let group = if mark == '.' { ',' } else { '.' };
            Some(text.replace(group, "").replace(mark, "."))
        }
        None => Some(text.replace(['.', ','], "")),
    }
}
