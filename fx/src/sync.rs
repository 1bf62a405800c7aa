//! Republishes settings and rate changes to legacy read paths.
//!
//! Older call sites read "current currency" and "current rates" from their
//! own globals. Instead of each keeping a private copy, they register a
//! [`LegacySink`] and the adapter pushes every change from the single
//! owners to them.

use parking_lot::RwLock;
use pricefx_common::{CurrencySettings, ExchangeRateSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::CacheEntry;

/// A legacy consumer of display settings and rates.
pub trait LegacySink: Send + Sync {
    fn publish_settings(&self, settings: &CurrencySettings);

    fn publish_rates(&self, snapshot: &ExchangeRateSnapshot);
}

/// In-memory legacy read path.
#[derive(Default)]
pub struct LegacyMirror {
    settings: RwLock<Option<CurrencySettings>>,
    rates: RwLock<Option<ExchangeRateSnapshot>>,
    publishes: AtomicU64,
}

impl LegacyMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_currency(&self) -> Option<CurrencySettings> {
        self.settings.read().clone()
    }

    pub fn rates(&self) -> Option<ExchangeRateSnapshot> {
        self.rates.read().clone()
    }

    /// Number of values published to this mirror.
    pub fn publishes(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }
}

impl LegacySink for LegacyMirror {
    fn publish_settings(&self, settings: &CurrencySettings) {
        *self.settings.write() = Some(settings.clone());
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    fn publish_rates(&self, snapshot: &ExchangeRateSnapshot) {
        *self.rates.write() = Some(snapshot.clone());
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a sync pass published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub settings: bool,
    pub rates: bool,
}

/// Bridges the settings store and rate cache to legacy sinks.
pub struct SyncAdapter {
    settings: watch::Receiver<Arc<CurrencySettings>>,
    rates: watch::Receiver<Option<Arc<CacheEntry>>>,
    sinks: Vec<Arc<dyn LegacySink>>,
}

impl SyncAdapter {
    pub fn new(
        settings: watch::Receiver<Arc<CurrencySettings>>,
        rates: watch::Receiver<Option<Arc<CacheEntry>>>,
    ) -> Self {
        Self {
            settings,
            rates,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LegacySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Push the current values to every sink regardless of change state.
    pub fn publish_all(&mut self) -> SyncReport {
        SyncReport {
            settings: self.push_settings(),
            rates: self.push_rates(),
        }
    }

    /// Push whatever changed since the last pass.
    pub fn sync_once(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        if self.settings.has_changed().unwrap_or(false) {
            report.settings = self.push_settings();
        }
        if self.rates.has_changed().unwrap_or(false) {
            report.rates = self.push_rates();
        }
        report
    }

    fn push_settings(&mut self) -> bool {
        let current = Arc::clone(&self.settings.borrow_and_update());
        for sink in &self.sinks {
            sink.publish_settings(&current);
        }
        true
    }

    fn push_rates(&mut self) -> bool {
        let Some(entry) = self.rates.borrow_and_update().clone() else {
            return false;
        };
        for sink in &self.sinks {
            sink.publish_rates(entry.snapshot());
        }
        true
    }

    /// Publish current values, then every change until both sources close.
    pub async fn run(mut self) {
        self.publish_all();

        let mut settings_open = true;
        let mut rates_open = true;
        while settings_open || rates_open {
            let (source, open) = tokio::select! {
                changed = self.settings.changed(), if settings_open => (Change::Settings, changed.is_ok()),
                changed = self.rates.changed(), if rates_open => (Change::Rates, changed.is_ok()),
            };

            match (source, open) {
                (Change::Settings, true) => {
                    self.push_settings();
                }
                (Change::Settings, false) => settings_open = false,
                (Change::Rates, true) => {
                    self.push_rates();
                }
                (Change::Rates, false) => rates_open = false,
            }
        }

        debug!("Sync adapter sources closed");
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        SyncHandle {
            handle: tokio::spawn(self.run()),
        }
    }
}

enum Change {
    Settings,
    Rates,
}

/// Running sync adapter. Dropping the handle stops it.
pub struct SyncHandle {
    handle: JoinHandle<()>,
}

impl SyncHandle {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RateCache, RateCacheConfig};
    use crate::provider::MockRateSource;
    use crate::settings::SettingsStore;
    use chrono::Utc;
    use pricefx_common::{default_offered_currencies, CurrencyCode};
    use std::collections::HashMap;
    use std::time::Duration;

    fn snapshot(idr: f64) -> ExchangeRateSnapshot {
        let mut rates = HashMap::new();
        rates.insert(CurrencyCode::idr(), idr);
        ExchangeRateSnapshot::validated(CurrencyCode::usd(), rates, Utc::now(), false).unwrap()
    }

    fn fixtures() -> (SettingsStore, RateCache, Arc<MockRateSource>) {
        let store =
            SettingsStore::new(CurrencySettings::idr(), default_offered_currencies()).unwrap();
        let source = Arc::new(MockRateSource::new("test"));
        let cache = RateCache::new(source.clone(), RateCacheConfig::default());
        (store, cache, source)
    }

    #[test]
    fn test_publish_all_seeds_mirror() {
        let (store, cache, _) = fixtures();
        let mirror = Arc::new(LegacyMirror::new());
        let mut adapter =
            SyncAdapter::new(store.subscribe(), cache.subscribe()).with_sink(mirror.clone());

        let report = adapter.publish_all();

        assert!(report.settings);
        assert!(!report.rates);
        assert_eq!(mirror.display_currency(), Some(CurrencySettings::idr()));
        assert!(mirror.rates().is_none());
    }

    #[test]
    fn test_sync_once_only_pushes_changes() {
        let (store, cache, _) = fixtures();
        let mirror = Arc::new(LegacyMirror::new());
        let mut adapter =
            SyncAdapter::new(store.subscribe(), cache.subscribe()).with_sink(mirror.clone());

        assert_eq!(adapter.sync_once(), SyncReport::default());

        store.select("USD").unwrap();
        cache.seed(snapshot(15800.0));

        let report = adapter.sync_once();
        assert!(report.settings && report.rates);
        assert_eq!(mirror.display_currency(), Some(CurrencySettings::usd()));
        assert_eq!(mirror.rates().unwrap().rate("IDR"), Some(15800.0));

        assert_eq!(adapter.sync_once(), SyncReport::default());
        assert_eq!(mirror.publishes(), 2);
    }

    #[test]
    fn test_multiple_sinks_stay_identical() {
        let (store, cache, _) = fixtures();
        let a = Arc::new(LegacyMirror::new());
        let b = Arc::new(LegacyMirror::new());
        let mut adapter = SyncAdapter::new(store.subscribe(), cache.subscribe())
            .with_sink(a.clone())
            .with_sink(b.clone());

        store.select("EUR").unwrap();
        adapter.sync_once();

        assert_eq!(a.display_currency(), b.display_currency());
        assert_eq!(a.display_currency(), Some(CurrencySettings::eur()));
    }

    #[tokio::test]
    async fn test_spawned_adapter_follows_refresh() {
        let (store, cache, source) = fixtures();
        source.set_default(Ok(snapshot(16000.0)));
        let mirror = Arc::new(LegacyMirror::new());
        let handle = SyncAdapter::new(store.subscribe(), cache.subscribe())
            .with_sink(mirror.clone())
            .spawn();

        cache.refresh().await;
        store.select("JPY").unwrap();

        for _ in 0..50 {
            if mirror.rates().is_some()
                && mirror.display_currency().map(|s| s.code) == Some(CurrencyCode::jpy())
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(mirror.rates().unwrap().rate("IDR"), Some(16000.0));
        assert_eq!(mirror.display_currency().unwrap().code, CurrencyCode::jpy());
        handle.stop();
    }

    #[tokio::test]
    async fn test_adapter_stops_when_sources_drop() {
        let (store, cache, _) = fixtures();
        let handle = SyncAdapter::new(store.subscribe(), cache.subscribe()).spawn();

        drop(store);
        drop(cache);

        for _ in 0..50 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_finished());
    }
}
