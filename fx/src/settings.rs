//! Display currency settings.

use pricefx_common::{CurrencyCode, CurrencySettings};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::error::SettingsError;

/// Sole owner of the user's display currency.
///
/// Readers get the current value synchronously through [`SettingsStore::current`];
/// [`SettingsStore::set_display_currency`] is the only writer.
pub struct SettingsStore {
    home: CurrencySettings,
    offered: Vec<CurrencySettings>,
    current: watch::Sender<Arc<CurrencySettings>>,
}

impl SettingsStore {
    /// Create a store whose display currency starts as `home`.
    ///
    /// `home` is added to the offered set if missing. Duplicate codes in the
    /// offered set are rejected.
    pub fn new(
        home: CurrencySettings,
        offered: Vec<CurrencySettings>,
    ) -> Result<Self, SettingsError> {
        let mut seen = HashSet::new();
        for settings in &offered {
            if !seen.insert(settings.code.clone()) {
                return Err(SettingsError::DuplicateCurrency(settings.code.clone()));
            }
        }

        let mut offered = offered;
        if !seen.contains(&home.code) {
            offered.insert(0, home.clone());
        }

        let (current, _) = watch::channel(Arc::new(home.clone()));
        Ok(Self {
            home,
            offered,
            current,
        })
    }

    pub fn home(&self) -> &CurrencySettings {
        &self.home
    }

    /// Current display currency.
    pub fn current(&self) -> Arc<CurrencySettings> {
        self.current.borrow().clone()
    }

    /// Offered currencies, home first if it was added implicitly.
    pub fn available(&self) -> &[CurrencySettings] {
        &self.offered
    }

    pub fn find(&self, code: &str) -> Option<&CurrencySettings> {
        let code = CurrencyCode::new(code).ok()?;
        self.offered.iter().find(|s| s.code == code)
    }

    /// Replace the display currency.
    ///
    /// The code must be offered; symbol and locale may differ from the
    /// offered defaults.
    pub fn set_display_currency(
        &self,
        settings: CurrencySettings,
    ) -> Result<Arc<CurrencySettings>, SettingsError> {
        if !self.offered.iter().any(|s| s.code == settings.code) {
            return Err(SettingsError::UnsupportedCurrency(settings.code.to_string()));
        }
        if settings.symbol.trim().is_empty() {
            return Err(SettingsError::EmptySymbol(settings.code));
        }

        let next = Arc::new(settings);
        let previous = self.current.send_replace(Arc::clone(&next));
        if previous != next {
            info!(
                from = %previous.code,
                to = %next.code,
                locale = %next.locale,
                "Display currency changed"
            );
        }
        Ok(next)
    }

    /// Switch to an offered currency by code, using its default symbol and locale.
    pub fn select(&self, code: &str) -> Result<Arc<CurrencySettings>, SettingsError> {
        let settings = self
            .find(code)
            .cloned()
            .ok_or_else(|| SettingsError::UnsupportedCurrency(code.trim().to_uppercase()))?;
        self.set_display_currency(settings)
    }

    /// Receive every display currency change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CurrencySettings>> {
        self.current.subscribe()
    }
}
