//! pricefx FX Engine
//!
//! Exchange rate caching, currency conversion and localized price formatting.
//!
//! # Features
//!
//! - Pluggable rate sources (HTTP, static fallback table)
//! - Snapshot cache with TTL, coalesced refresh and stale serving
//! - Direct, inverse and cross-rate conversion through a single base
//! - Locale-aware price formatting and parsing
//! - Persisted display currency and last snapshot
//! - Republishing of settings and rates to legacy consumers
//!
//! # Example
//!
//! ```rust,ignore
//! use pricefx_fx::{CurrencyService, FxConfig, StaticRateSource};
//! use std::sync::Arc;
//!
//! let service = CurrencyService::init(FxConfig::default(), Arc::new(StaticRateSource), None)?;
//!
//! service.select_display_currency("USD")?;
//! service.refresh_if_needed().await;
//!
//! // 160,000 IDR shown in dollars
//! println!("{}", service.format_price(160_000.0));
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod locale;
pub mod persist;
pub mod provider;
pub mod service;
pub mod settings;
pub mod sync;

pub use cache::{CacheEntry, CacheStats, Freshness, RateCache, RateCacheConfig, RateStatus, RefreshOutcome};
pub use config::FxConfig;
pub use engine::{convert, get_rate, Conversion, ConversionRequest, RateOrigin, RateQuote};
pub use error::{ConfigError, FxError, FxResult, PersistError, SettingsError};
pub use format::{FormatOptions, Formatter};
pub use persist::{FileStateStore, MemoryStateStore, PersistedState, StatePersister, StateStore};
pub use provider::{HttpRateSource, RateSource, StaticRateSource};
pub use service::{CurrencyService, ServiceStats};
pub use settings::SettingsStore;
pub use sync::{LegacyMirror, LegacySink, SyncAdapter, SyncHandle};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
