//! Consumer facade over the settings store, rate cache and formatter.

use parking_lot::Mutex;
use pricefx_common::{normalize_amount, CurrencySettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, RateCache, RateStatus, RefreshOutcome};
use crate::config::FxConfig;
use crate::engine::{resolve_rate, Conversion, ConversionRequest};
use crate::error::{ConfigError, PersistError, SettingsError};
use crate::format::{FormatOptions, Formatter};
use crate::persist::{load_state, save_state, PersistedState, StatePersister, StateStore};
use crate::provider::RateSource;
use crate::settings::SettingsStore;
use crate::sync::{LegacySink, SyncAdapter, SyncHandle};

/// Service statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub cache: CacheStats,
    /// Conversions that passed the amount through for lack of a rate.
    pub degraded_conversions: u64,
}

/// Display-currency conversion and formatting for consumers.
///
/// Owns the single [`SettingsStore`] and
/// [`RateCache`] for the process between [`CurrencyService::init`] and
/// [`CurrencyService::shutdown`].
pub struct CurrencyService {
    settings: SettingsStore,
    cache: RateCache,
    formatter: Formatter,
    state: Option<Arc<dyn StateStore>>,
    state_key: String,
    degraded: AtomicU64,
    sync: Mutex<Option<SyncHandle>>,
    persister: Mutex<Option<SyncHandle>>,
}

impl CurrencyService {
    /// Build the service and restore persisted state.
    ///
    /// A persisted snapshot seeds the cache as-is, so it is fresh or stale
    /// depending on its age. A persisted display currency is applied when it
    /// is still offered. When a tokio runtime is available, every later change
    /// to the display currency or rates is written to the state store, and a
    /// background refresh is started if the seeded rates are missing or expired.
    pub fn init(
        config: FxConfig,
        source: Arc<dyn RateSource>,
        state: Option<Arc<dyn StateStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let settings = SettingsStore::new(config.home, config.offered)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let cache = RateCache::new(source, config.cache);

        let service = Self {
            settings,
            cache,
            formatter: Formatter::new(config.no_decimal),
            state,
            state_key: config.state_key,
            degraded: AtomicU64::new(0),
            sync: Mutex::new(None),
            persister: Mutex::new(None),
        };

        service.restore();
        service.start_persister();
        service.cache.spawn_refresh_if_needed();

        info!(
            home = %service.settings.home().code,
            display = %service.settings.current().code,
            anchor = %service.cache.config().anchor,
            freshness = ?service.cache.freshness(),
            "Currency service initialized"
        );
        Ok(service)
    }

    fn restore(&self) {
        let Some(store) = &self.state else {
            return;
        };
        let Some(state) = load_state(store.as_ref(), &self.state_key) else {
            return;
        };

        if let Some(snapshot) = state.exchange_rate_snapshot {
            if snapshot.base() == &self.cache.config().anchor {
                self.cache.seed(snapshot);
            } else {
                warn!(
                    base = %snapshot.base(),
                    anchor = %self.cache.config().anchor,
                    "Ignoring persisted snapshot for a different anchor"
                );
            }
        }

        if let Some(display) = state.display_currency {
            if let Err(e) = self.settings.set_display_currency(display) {
                warn!(error = %e, "Ignoring persisted display currency");
            }
        }
    }

    fn start_persister(&self) {
        let Some(store) = &self.state else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("No tokio runtime, state is persisted on explicit changes only");
            return;
        }

        let initial = self.current_state();
        let persister = StatePersister::new(Arc::clone(store), self.state_key.clone(), initial);
        let handle = self.sync_adapter().with_sink(Arc::new(persister)).spawn();
        *self.persister.lock() = Some(handle);
    }

    /// Stop background work and write the current state.
    pub fn shutdown(&self) {
        for slot in [&self.sync, &self.persister] {
            if let Some(handle) = slot.lock().take() {
                handle.stop();
            }
        }
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist currency state on shutdown");
        }
        debug!("Currency service shut down");
    }

    /// Write the display currency and latest snapshot to the state store.
    pub fn persist(&self) -> Result<(), PersistError> {
        let Some(store) = &self.state else {
            return Ok(());
        };

        save_state(store.as_ref(), &self.state_key, &self.current_state())
    }

    fn current_state(&self) -> PersistedState {
        PersistedState {
            display_currency: Some(self.settings.current().as_ref().clone()),
            exchange_rate_snapshot: self.cache.get().map(|e| e.snapshot().clone()),
        }
    }

    fn persist_best_effort(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist currency state");
        }
    }

    pub fn display_currency(&self) -> Arc<CurrencySettings> {
        self.settings.current()
    }

    pub fn home_currency(&self) -> &CurrencySettings {
        self.settings.home()
    }

    pub fn available_currencies(&self) -> &[CurrencySettings] {
        self.settings.available()
    }

    /// Change the display currency and persist it.
    pub fn set_display_currency(
        &self,
        settings: CurrencySettings,
    ) -> Result<Arc<CurrencySettings>, SettingsError> {
        let current = self.settings.set_display_currency(settings)?;
        self.persist_best_effort();
        Ok(current)
    }

    /// Change the display currency to an offered code.
    pub fn select_display_currency(
        &self,
        code: &str,
    ) -> Result<Arc<CurrencySettings>, SettingsError> {
        let current = self.settings.select(code)?;
        self.persist_best_effort();
        Ok(current)
    }

    /// Convert `amount` into the display currency.
    ///
    /// `from` defaults to the home currency when absent or empty. Uses the
    /// cached snapshot even if stale, or the static table when there is none,
    /// and kicks off a background refresh when the rates need one.
    pub fn convert(&self, amount: f64, from: Option<&str>) -> f64 {
        self.convert_into(amount, from, &self.settings.current())
    }

    fn convert_into(&self, amount: f64, from: Option<&str>, display: &CurrencySettings) -> f64 {
        let home = self.settings.home().code.as_str();
        let from = from.map(str::trim).filter(|code| !code.is_empty()).unwrap_or(home);

        let entry = self.cache.get();
        let quote = resolve_rate(from, display.code.as_str(), entry.as_ref().map(|e| e.snapshot()));
        if quote.origin.is_degraded() {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }

        self.cache.spawn_refresh_if_needed();
        normalize_amount(amount) * quote.rate
    }

    /// Convert between two arbitrary currencies, reporting where the rate came from.
    pub fn convert_between(&self, request: &ConversionRequest) -> Conversion {
        let entry = self.cache.get();
        let conversion = request.execute(entry.as_ref().map(|e| e.snapshot()));
        if conversion.quote.origin.is_degraded() {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        self.cache.spawn_refresh_if_needed();
        conversion
    }

    /// Convert a home-currency amount and format it in the display currency.
    pub fn format_price(&self, amount_home: f64) -> String {
        self.format_price_with(amount_home, FormatOptions::default())
    }

    pub fn format_price_with(&self, amount_home: f64, options: FormatOptions) -> String {
        let display = self.settings.current();
        let converted = self.convert_into(amount_home, None, &display);
        self.formatter.format_with(converted, &display, options)
    }

    /// Like [`CurrencyService::format_price`] with K/M/B abbreviation.
    pub fn compact_price(&self, amount_home: f64) -> String {
        let display = self.settings.current();
        let converted = self.convert_into(amount_home, None, &display);
        self.formatter.compact(converted, &display)
    }

    /// Parse a price typed in the display currency's conventions.
    pub fn parse_price(&self, text: &str) -> f64 {
        self.formatter
            .parse_with_locale(text, &self.settings.current().locale)
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn rate_status(&self) -> RateStatus {
        self.cache.status()
    }

    /// Refresh the rates if missing or expired, persisting a new snapshot.
    pub async fn refresh_if_needed(&self) -> Option<RefreshOutcome> {
        let outcome = self.cache.refresh_if_needed().await;
        if matches!(outcome, Some(RefreshOutcome::Updated)) {
            self.persist_best_effort();
        }
        outcome
    }

    /// Force a refresh regardless of freshness.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = self.cache.refresh().await;
        if outcome.is_updated() {
            self.persist_best_effort();
        }
        outcome
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            degraded_conversions: self.degraded.load(Ordering::Relaxed),
        }
    }

    pub fn rate_cache(&self) -> &RateCache {
        &self.cache
    }

    /// An adapter wired to this service's settings and rates.
    pub fn sync_adapter(&self) -> SyncAdapter {
        SyncAdapter::new(self.settings.subscribe(), self.cache.subscribe())
    }

    /// Keep `sinks` updated in the background until shutdown.
    ///
    /// Replaces any previously started sync task.
    pub fn start_sync(&self, sinks: impl IntoIterator<Item = Arc<dyn LegacySink>>) {
        let adapter = sinks
            .into_iter()
            .fold(self.sync_adapter(), |adapter, sink| adapter.with_sink(sink));
        let previous = self.sync.lock().replace(adapter.spawn());
        if let Some(previous) = previous {
            previous.stop();
        }
    }
}
