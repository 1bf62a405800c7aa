//! Currency service configuration.

use chrono::Duration;
use pricefx_common::{default_offered_currencies, CurrencyCode, CurrencySettings};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::cache::RateCacheConfig;
use crate::error::ConfigError;
use crate::format::default_no_decimal_currencies;
use crate::persist::DEFAULT_STATE_KEY;

/// Main currency service configuration.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Currency amounts are authored in, and the default display currency.
    pub home: CurrencySettings,
    /// Currencies a user may pick as display currency.
    pub offered: Vec<CurrencySettings>,
    /// Rate cache configuration.
    pub cache: RateCacheConfig,
    /// Currencies displayed without minor units.
    pub no_decimal: Vec<CurrencyCode>,
    /// Upstream URL template; `{anchor}` is replaced with the anchor code.
    pub rates_url: Option<String>,
    /// Directory for persisted state. Nothing is persisted when unset.
    pub state_dir: Option<PathBuf>,
    /// Key persisted state is stored under.
    pub state_key: String,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            home: CurrencySettings::idr(),
            offered: default_offered_currencies(),
            cache: RateCacheConfig::default(),
            no_decimal: default_no_decimal_currencies(),
            rates_url: None,
            state_dir: None,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl FxConfig {
    /// Load configuration from `PRICEFX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(code) = get("PRICEFX_HOME_CURRENCY") {
            let code = parse_code("PRICEFX_HOME_CURRENCY", &code)?;
            config.home = config
                .offered
                .iter()
                .find(|s| s.code == code)
                .cloned()
                .ok_or(ConfigError::InvalidEnv {
                    var: "PRICEFX_HOME_CURRENCY",
                    value: code.to_string(),
                })?;
        }

        if let Some(code) = get("PRICEFX_ANCHOR_CURRENCY") {
            config.cache.anchor = parse_code("PRICEFX_ANCHOR_CURRENCY", &code)?;
        }

        if let Some(secs) = get("PRICEFX_RATE_TTL_SECS") {
            config.cache.ttl = parse_secs("PRICEFX_RATE_TTL_SECS", &secs)?;
        }

        if let Some(secs) = get("PRICEFX_FETCH_TIMEOUT_SECS") {
            config.cache.fetch_timeout = parse_secs("PRICEFX_FETCH_TIMEOUT_SECS", &secs)?;
        }

        if let Some(url) = get("PRICEFX_RATES_URL") {
            config.rates_url = Some(url);
        }

        if let Some(dir) = get("PRICEFX_STATE_DIR") {
            config.state_dir = Some(PathBuf::from(dir));
        }

        if let Some(key) = get("PRICEFX_STATE_KEY") {
            config.state_key = key;
        }

        if let Some(codes) = lookup("PRICEFX_NO_DECIMAL_CURRENCIES") {
            config.no_decimal = codes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| parse_code("PRICEFX_NO_DECIMAL_CURRENCIES", c))
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl <= Duration::zero() {
            return Err(ConfigError::Invalid("Rate TTL must be positive".to_string()));
        }

        if self.cache.fetch_timeout <= Duration::zero() {
            return Err(ConfigError::Invalid(
                "Fetch timeout must be positive".to_string(),
            ));
        }

        if self.home.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Home currency symbol cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for settings in &self.offered {
            if !seen.insert(&settings.code) {
                return Err(ConfigError::Invalid(format!(
                    "Currency {} offered more than once",
                    settings.code
                )));
            }
        }

        if self.state_key.trim().is_empty() {
            return Err(ConfigError::Invalid("State key cannot be empty".to_string()));
        }

        if let Some(url) = &self.rates_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "Rates URL must be http(s): {url}"
                )));
            }
        }

        Ok(())
    }
}

fn parse_code(var: &'static str, value: &str) -> Result<CurrencyCode, ConfigError> {
    CurrencyCode::new(value).map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::seconds)
        .ok_or(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = FxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.home, CurrencySettings::idr());
        assert_eq!(config.cache.anchor, CurrencyCode::usd());
        assert_eq!(config.cache.ttl, Duration::minutes(30));
        assert_eq!(config.state_key, "pricefx.currency.v1");
    }

    #[test]
    fn test_from_lookup() {
        let config = FxConfig::from_lookup(lookup(&[
            ("PRICEFX_HOME_CURRENCY", "usd"),
            ("PRICEFX_ANCHOR_CURRENCY", "EUR"),
            ("PRICEFX_RATE_TTL_SECS", "60"),
            ("PRICEFX_FETCH_TIMEOUT_SECS", "3"),
            ("PRICEFX_RATES_URL", "https://rates.example/{anchor}"),
            ("PRICEFX_STATE_DIR", "/var/lib/pricefx"),
            ("PRICEFX_NO_DECIMAL_CURRENCIES", "JPY, KRW"),
        ]))
        .unwrap();

        assert_eq!(config.home, CurrencySettings::usd());
        assert_eq!(config.cache.anchor, CurrencyCode::eur());
        assert_eq!(config.cache.ttl, Duration::seconds(60));
        assert_eq!(config.cache.fetch_timeout, Duration::seconds(3));
        assert_eq!(config.state_dir, Some(PathBuf::from("/var/lib/pricefx")));
        assert_eq!(config.no_decimal, vec![CurrencyCode::jpy(), CurrencyCode::new("KRW").unwrap()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_values() {
        let err = FxConfig::from_lookup(lookup(&[("PRICEFX_RATE_TTL_SECS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: "PRICEFX_RATE_TTL_SECS",
                value: "soon".to_string()
            }
        );

        assert!(FxConfig::from_lookup(lookup(&[("PRICEFX_FETCH_TIMEOUT_SECS", "0")])).is_err());
        assert!(FxConfig::from_lookup(lookup(&[("PRICEFX_HOME_CURRENCY", "CHF")])).is_err());
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = FxConfig::from_lookup(lookup(&[("PRICEFX_STATE_DIR", "  ")])).unwrap();
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = FxConfig::default();
        config.cache.ttl = Duration::zero();
        assert!(config.validate().is_err());

        let mut config = FxConfig::default();
        config.rates_url = Some("ftp://rates".to_string());
        assert!(config.validate().is_err());

        let mut config = FxConfig::default();
        config.offered.push(CurrencySettings::usd());
        assert!(config.validate().is_err());
    }
}
