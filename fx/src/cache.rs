//! Exchange rate snapshot cache with TTL and coalesced refresh.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pricefx_common::{constants, is_older_than, CurrencyCode, DurationExt, ExchangeRateSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::FxError;
use crate::provider::RateSource;

/// A cached snapshot with its computed expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    snapshot: ExchangeRateSnapshot,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(snapshot: ExchangeRateSnapshot, ttl: Duration) -> Self {
        let expires_at = snapshot.fetched_at() + ttl;
        Self {
            snapshot,
            expires_at,
        }
    }

    pub fn snapshot(&self) -> &ExchangeRateSnapshot {
        &self.snapshot
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired once the snapshot age strictly exceeds the TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Currency every snapshot is requested against.
    pub anchor: CurrencyCode,
    /// Snapshot time-to-live.
    pub ttl: Duration,
    /// Upper bound for a single upstream fetch.
    pub fetch_timeout: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            anchor: CurrencyCode::usd(),
            ttl: constants::rate_ttl(),
            fetch_timeout: constants::fetch_timeout(),
        }
    }
}

/// Freshness of the cached rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No fetch has completed yet.
    Uninitialized,
    /// Snapshot within its TTL.
    Fresh,
    /// Snapshot past its TTL, still served.
    Stale,
    /// No fetch has ever succeeded; the static table is in use.
    Fallback,
}

/// Degradation flags callers may surface to users.
#[derive(Debug, Clone, PartialEq)]
pub struct RateStatus {
    pub freshness: Freshness,
    pub is_stale: bool,
    pub is_fallback: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A new snapshot was published.
    Updated,
    /// The attempt failed; the previous entry is untouched.
    Failed(FxError),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, RefreshOutcome::Updated)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fetch_attempts: u64,
    pub fetch_successes: u64,
    pub fetch_failures: u64,
    pub coalesced_refreshes: u64,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    coalesced: AtomicU64,
}

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct Inner {
    source: Arc<dyn RateSource>,
    config: RateCacheConfig,
    entry: watch::Sender<Option<Arc<CacheEntry>>>,
    in_flight: Mutex<Option<PendingRefresh>>,
    last_error: Mutex<Option<FxError>>,
    counters: Counters,
}

impl Inner {
    #[instrument(skip(self), fields(source = %self.source.name(), anchor = %self.config.anchor))]
    async fn fetch_and_store(&self) -> RefreshOutcome {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let timeout = self.config.fetch_timeout.as_std();
        let result = match tokio::time::timeout(timeout, self.source.fetch(&self.config.anchor)).await
        {
            Ok(result) => result,
            Err(_) => Err(FxError::Timeout(timeout.as_millis() as u64)),
        };

        match result {
            Ok(snapshot) => {
                let entry = Arc::new(CacheEntry::new(snapshot, self.config.ttl));
                info!(
                    base = %entry.snapshot().base(),
                    rates = entry.snapshot().rates().len(),
                    fetched_at = %entry.snapshot().fetched_at(),
                    "Rate snapshot refreshed"
                );
                self.entry.send_replace(Some(entry));
                *self.last_error.lock() = None;
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                RefreshOutcome::Updated
            }
            Err(e) => {
                warn!(
                    error = %e,
                    has_previous = self.entry.borrow().is_some(),
                    "Rate refresh failed, keeping previous snapshot"
                );
                *self.last_error.lock() = Some(e.clone());
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                RefreshOutcome::Failed(e)
            }
        }
    }
}

/// Holds the most recent good snapshot and refreshes it on demand.
///
/// Cloning is cheap and every clone shares the same entry. The entry is
/// replaced wholesale on success, so a reader holding an `Arc<CacheEntry>`
/// never sees a partially updated snapshot.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<Inner>,
}

impl RateCache {
    /// Create an empty cache backed by `source`.
    pub fn new(source: Arc<dyn RateSource>, config: RateCacheConfig) -> Self {
        let (entry, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                entry,
                in_flight: Mutex::new(None),
                last_error: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &RateCacheConfig {
        &self.inner.config
    }

    /// Current entry, possibly stale. Never blocks on a refresh.
    pub fn get(&self) -> Option<Arc<CacheEntry>> {
        self.inner.entry.borrow().clone()
    }

    /// Install a snapshot without fetching, e.g. one restored from disk.
    pub fn seed(&self, snapshot: ExchangeRateSnapshot) {
        let entry = Arc::new(CacheEntry::new(snapshot, self.inner.config.ttl));
        debug!(fetched_at = %entry.snapshot().fetched_at(), "Seeding rate cache");
        self.inner.entry.send_replace(Some(entry));
    }

    /// Receive every published entry.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CacheEntry>>> {
        self.inner.entry.subscribe()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True when there is an entry and its age exceeds the TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.get().map_or(false, |entry| {
            is_older_than(entry.snapshot().fetched_at(), self.inner.config.ttl, now)
        })
    }

    fn needs_refresh(&self) -> bool {
        self.get().is_none() || self.is_expired()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness_at(Utc::now())
    }

    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        match self.get() {
            Some(entry) if entry.is_expired_at(now) => Freshness::Stale,
            Some(_) => Freshness::Fresh,
            None if self.inner.counters.failures.load(Ordering::Relaxed) > 0 => {
                Freshness::Fallback
            }
            None => Freshness::Uninitialized,
        }
    }

    /// Flags describing how degraded the current rates are.
    pub fn status(&self) -> RateStatus {
        let freshness = self.freshness();
        let entry = self.get();
        RateStatus {
            freshness,
            is_stale: freshness == Freshness::Stale,
            is_fallback: freshness == Freshness::Fallback
                || entry.as_ref().map_or(false, |e| e.snapshot().is_fallback()),
            fetched_at: entry.map(|e| e.snapshot().fetched_at()),
            last_error: self.inner.last_error.lock().as_ref().map(|e| e.to_string()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            fetch_attempts: counters.attempts.load(Ordering::Relaxed),
            fetch_successes: counters.successes.load(Ordering::Relaxed),
            fetch_failures: counters.failures.load(Ordering::Relaxed),
            coalesced_refreshes: counters.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Fetch a new snapshot. Joins the in-flight refresh if there is one.
    ///
    /// Failures are recorded and returned as [`RefreshOutcome::Failed`];
    /// they never disturb the stored entry.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.join_or_start().await
    }

    /// Refresh when there is no entry or it has expired.
    ///
    /// Returns `None` when the current entry is still fresh.
    pub async fn refresh_if_needed(&self) -> Option<RefreshOutcome> {
        if !self.needs_refresh() {
            return None;
        }
        Some(self.refresh().await)
    }

    /// Start a background refresh if one is needed.
    ///
    /// Returns whether a refresh was started or joined. Without a tokio
    /// runtime this is a no-op.
    pub fn spawn_refresh_if_needed(&self) -> bool {
        if !self.needs_refresh() {
            return false;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pending = self.join_or_start();
                handle.spawn(async move {
                    pending.await;
                });
                true
            }
            Err(_) => {
                debug!("No async runtime, skipping background rate refresh");
                false
            }
        }
    }

    fn join_or_start(&self) -> PendingRefresh {
        let mut slot = self.inner.in_flight.lock();
        if let Some(pending) = slot.as_ref() {
            self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!("Joining in-flight rate refresh");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let pending = async move {
            let outcome = inner.fetch_and_store().await;
            inner.in_flight.lock().take();
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        pending
    }
}
