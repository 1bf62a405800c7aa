//! Rate source trait and implementations.

use async_trait::async_trait;
use pricefx_common::{CurrencyCode, ExchangeRateSnapshot, SnapshotPayload};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::engine;
use crate::error::{FxError, FxResult};

/// Upstream provider of exchange rate snapshots.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch a snapshot anchored to `anchor`.
    async fn fetch(&self, anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot>;
}

/// Fetches snapshots from a JSON HTTP endpoint.
///
/// The URL template may contain `{anchor}`, which is replaced by the anchor
/// currency code. The endpoint must answer with
/// `{base, rates, fetchedAtUtc, isFallback}`.
pub struct HttpRateSource {
    client: Client,
    url_template: String,
}

impl HttpRateSource {
    /// Create a new HTTP source with a client-level request timeout.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn url_for(&self, anchor: &CurrencyCode) -> String {
        self.url_template.replace("{anchor}", anchor.as_str())
    }
}

/// Decode a provider response body into a validated snapshot.
pub fn parse_payload(body: &str, anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot> {
    let payload: SnapshotPayload =
        serde_json::from_str(body).map_err(|e| FxError::Parse(e.to_string()))?;
    let snapshot = ExchangeRateSnapshot::try_from(payload)?;

    if snapshot.base() != anchor {
        return Err(FxError::AnchorMismatch {
            requested: anchor.clone(),
            actual: snapshot.base().clone(),
        });
    }

    Ok(snapshot)
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn fetch(&self, anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot> {
        let url = self.url_for(anchor);
        debug!(url = %url, anchor = %anchor, "Requesting rates");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FxError::Fetch(format!(
                "rate request failed: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_payload(&body, anchor)
    }
}

/// Serves the built-in static table, re-anchored on request.
///
/// Snapshots are always flagged as fallback data.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRateSource;

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch(&self, anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot> {
        let table = engine::fallback_table();
        if !table.contains(anchor.as_str()) {
            return Err(FxError::Fetch(format!(
                "static table has no rate for anchor {anchor}"
            )));
        }

        let rates: HashMap<CurrencyCode, f64> = table
            .rates()
            .keys()
            .chain(std::iter::once(table.base()))
            .filter(|code| *code != anchor)
            .map(|code| {
                let rate = engine::get_rate(anchor.as_str(), code.as_str(), Some(table));
                (code.clone(), rate)
            })
            .collect();

        Ok(ExchangeRateSnapshot::validated(
            anchor.clone(),
            rates,
            pricefx_common::now(),
            true,
        )?)
    }
}

/// Scripted rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    responses: parking_lot::Mutex<std::collections::VecDeque<FxResult<ExchangeRateSnapshot>>>,
    fallback: parking_lot::Mutex<Option<FxResult<ExchangeRateSnapshot>>>,
    delay: Option<Duration>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source that fails until responses are queued.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            fallback: parking_lot::Mutex::new(None),
            delay: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a one-shot response.
    pub fn push(&self, response: FxResult<ExchangeRateSnapshot>) {
        self.responses.lock().push_back(response);
    }

    /// Response used once the queue is empty.
    pub fn set_default(&self, response: FxResult<ExchangeRateSnapshot>) {
        *self.fallback.lock() = Some(response);
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _anchor: &CurrencyCode) -> FxResult<ExchangeRateSnapshot> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }

        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| Err(FxError::Fetch("no scripted response".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        let body = r#"{"base":"USD","rates":{"IDR":15800,"EUR":0.92},"fetchedAtUtc":"2024-05-01T10:00:00Z","isFallback":false}"#;
        let snapshot = parse_payload(body, &CurrencyCode::usd()).unwrap();

        assert_eq!(snapshot.rate("IDR"), Some(15800.0));
        assert_eq!(snapshot.rate("EUR"), Some(0.92));
        assert!(!snapshot.is_fallback());
    }

    #[test]
    fn test_parse_payload_malformed() {
        let result = parse_payload("{not json", &CurrencyCode::usd());
        assert!(matches!(result, Err(FxError::Parse(_))));

        let body = r#"{"base":"USD","rates":{"EUR":-1},"fetchedAtUtc":"2024-05-01T10:00:00Z"}"#;
        let result = parse_payload(body, &CurrencyCode::usd());
        assert!(matches!(result, Err(FxError::InvalidSnapshot(_))));
        assert!(result.unwrap_err().is_parse_failure());
    }

    #[test]
    fn test_parse_payload_anchor_mismatch() {
        let body = r#"{"base":"EUR","rates":{"USD":1.08},"fetchedAtUtc":"2024-05-01T10:00:00Z"}"#;
        let result = parse_payload(body, &CurrencyCode::usd());
        assert!(matches!(result, Err(FxError::AnchorMismatch { .. })));
    }

    #[test]
    fn test_url_template() {
        let source =
            HttpRateSource::new("https://rates.test/latest/{anchor}", Duration::from_secs(10))
                .unwrap();
        assert_eq!(
            source.url_for(&CurrencyCode::usd()),
            "https://rates.test/latest/USD"
        );
    }

    #[tokio::test]
    async fn test_static_source_reanchors() {
        let snapshot = StaticRateSource.fetch(&CurrencyCode::idr()).await.unwrap();

        assert_eq!(snapshot.base(), &CurrencyCode::idr());
        assert!(snapshot.is_fallback());
        let usd = snapshot.rate("USD").unwrap();
        assert!((usd - 1.0 / 15800.0).abs() < 1e-12);
        assert!(!snapshot.rates().contains_key("IDR"));
    }

    #[test]
    fn test_static_source_unknown_anchor() {
        let anchor = CurrencyCode::new("XYZ").unwrap();
        assert!(tokio_test::block_on(StaticRateSource.fetch(&anchor)).is_err());
    }

    #[tokio::test]
    async fn test_mock_source_script() {
        let source = MockRateSource::new("test");
        source.push(Err(FxError::Fetch("down".to_string())));

        assert!(source.fetch(&CurrencyCode::usd()).await.is_err());
        assert!(source.fetch(&CurrencyCode::usd()).await.is_err());
        assert_eq!(source.calls(), 2);
    }
}
