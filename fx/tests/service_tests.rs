//! End-to-end tests for the currency service against a scripted rate source.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pricefx_common::{CurrencyCode, ExchangeRateSnapshot};
use pricefx_fx::{
    CurrencyService, FileStateStore, Freshness, FxConfig, FxError, FxResult, LegacyMirror,
    LegacySink, RateSource, StateStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

/// Serves a fixed USD snapshot after a delay, or fails while `offline` is set.
struct ScriptedSource {
    idr: f64,
    delay: std::time::Duration,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(idr: f64) -> Self {
        Self {
            idr,
            delay: std::time::Duration::from_millis(25),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(FxError::Fetch("connection refused".to_string()));
        }

        let mut rates = HashMap::new();
        rates.insert(CurrencyCode::idr(), self.idr);
        rates.insert(CurrencyCode::eur(), 0.92);
        Ok(ExchangeRateSnapshot::validated(
            anchor.clone(),
            rates,
            Utc::now(),
            false,
        )?)
    }
}

fn config_in(dir: &std::path::Path) -> FxConfig {
    FxConfig {
        state_dir: Some(dir.to_path_buf()),
        ..FxConfig::default()
    }
}

fn file_store(config: &FxConfig) -> Option<Arc<dyn StateStore>> {
    config
        .state_dir
        .as_ref()
        .map(|dir| Arc::new(FileStateStore::new(dir)) as Arc<dyn StateStore>)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_share_one_fetch() {
    let source = Arc::new(ScriptedSource::new(16000.0));
    let service = Arc::new(
        CurrencyService::init(FxConfig::default(), source.clone(), None).unwrap(),
    );

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.refresh_if_needed().await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(service.rate_status().freshness, Freshness::Fresh);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prices_never_mix_two_display_currencies() {
    let source = Arc::new(ScriptedSource::new(15800.0));
    let service = Arc::new(CurrencyService::init(FxConfig::default(), source, None).unwrap());
    service.refresh_if_needed().await;

    let stop = Arc::new(AtomicBool::new(false));
    let toggler = {
        let service = Arc::clone(&service);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut usd = true;
            while !stop.load(Ordering::Relaxed) {
                service
                    .select_display_currency(if usd { "USD" } else { "IDR" })
                    .unwrap();
                usd = !usd;
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    let price = service.format_price(158_000.0);
                    assert!(
                        price == "Rp 158.000" || price == "$10.00",
                        "mixed rendering: {price}"
                    );
                    let compact = service.compact_price(158_000.0);
                    assert!(
                        compact == "Rp158.0K" || compact == "$10.00",
                        "mixed compact rendering: {compact}"
                    );
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    toggler.join().unwrap();
}

#[tokio::test]
async fn display_change_converts_home_prices() {
    let source = Arc::new(ScriptedSource::new(16000.0));
    let service = CurrencyService::init(FxConfig::default(), source, None).unwrap();
    service.refresh_if_needed().await;

    assert_eq!(service.format_price(160_000.0), "Rp 160.000");

    service.select_display_currency("USD").unwrap();
    assert_eq!(service.format_price(160_000.0), "$10.00");
    assert_eq!(service.compact_price(16_000_000_000.0), "$1.0M");

    service.select_display_currency("EUR").unwrap();
    assert_eq!(service.format_price(16_000.0), "0,92 €");
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let source = Arc::new(ScriptedSource::new(15500.0));
    let first = CurrencyService::init(config.clone(), source, file_store(&config)).unwrap();
    first.refresh_if_needed().await;
    first.select_display_currency("USD").unwrap();
    first.shutdown();

    let offline = Arc::new(ScriptedSource::new(99999.0));
    offline.offline.store(true, Ordering::SeqCst);
    let second = CurrencyService::init(config.clone(), offline.clone(), file_store(&config)).unwrap();

    assert_eq!(second.display_currency().code, CurrencyCode::usd());
    assert_eq!(second.rate_status().freshness, Freshness::Fresh);
    assert!((second.convert(15_500.0, None) - 1.0).abs() < 1e-9);
    assert_eq!(offline.calls(), 0);
}

#[tokio::test]
async fn stale_rates_served_while_offline() {
    let mut config = FxConfig::default();
    config.cache.ttl = Duration::milliseconds(50);

    let source = Arc::new(ScriptedSource::new(16000.0));
    let service = CurrencyService::init(config, source.clone(), None).unwrap();
    service.refresh_if_needed().await;
    service.select_display_currency("USD").unwrap();

    source.offline.store(true, Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    for _ in 0..3 {
        let outcome = service.refresh_if_needed().await.unwrap();
        assert!(!outcome.is_updated());
    }

    let status = service.rate_status();
    assert_eq!(status.freshness, Freshness::Stale);
    assert!(status.is_stale);
    assert!(status.last_error.is_some());
    assert!((service.convert(32_000.0, None) - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn legacy_sinks_follow_the_service() {
    let source = Arc::new(ScriptedSource::new(16000.0));
    let service = CurrencyService::init(FxConfig::default(), source, None).unwrap();
    let mirror = Arc::new(LegacyMirror::new());
    service.start_sync([mirror.clone() as Arc<dyn LegacySink>]);

    service.refresh_if_needed().await;
    service.select_display_currency("EUR").unwrap();

    for _ in 0..50 {
        if mirror.rates().is_some()
            && mirror.display_currency().map(|s| s.code) == Some(CurrencyCode::eur())
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(mirror.rates().unwrap().rate("IDR"), Some(16000.0));
    assert_eq!(mirror.display_currency().unwrap().code, CurrencyCode::eur());
    service.shutdown();
}
