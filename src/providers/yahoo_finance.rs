use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use reqwest::header::REFERER;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

use crate::core::config::FetchConfig;
use crate::core::search::{SearchCandidate, SearchProvider};
use crate::core::snapshot::{FetchError, PricePoint, Snapshot, SnapshotProvider};
use crate::core::ticker::TickerSymbol;
use crate::providers::util::{http_client, with_retry};

const SUMMARY_MODULES: &str = "price,financialData,defaultKeyStatistics";
const SEARCH_QUOTES_COUNT: usize = 10;
const FINANCE_REFERER: &str = "https://finance.yahoo.com/";
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const MAX_CRUMB_LEN: usize = 100;

fn to_decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value).map(|d| d.normalize())
    } else {
        None
    }
}

/// Yahoo wraps most numbers as `{"raw": 1.23, "fmt": "1.23"}` and reports
/// missing ones as `{}`.
#[derive(Deserialize, Debug, Default)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl RawValue {
    fn decimal(value: &Option<RawValue>) -> Option<Decimal> {
        value.as_ref().and_then(|v| v.raw).and_then(to_decimal)
    }
}

#[derive(Deserialize, Debug)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummary,
}

#[derive(Deserialize, Debug)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryItem>>,
    #[serde(default)]
    error: Option<QuoteSummaryError>,
}

#[derive(Deserialize, Debug)]
struct QuoteSummaryError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct QuoteSummaryItem {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(rename = "financialData", default)]
    financial_data: Option<FinancialData>,
    #[serde(rename = "defaultKeyStatistics", default)]
    key_statistics: Option<KeyStatistics>,
}

#[derive(Deserialize, Debug, Default)]
struct PriceModule {
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: Option<RawValue>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct FinancialData {
    #[serde(rename = "currentPrice", default)]
    current_price: Option<RawValue>,
    #[serde(rename = "returnOnEquity", default)]
    return_on_equity: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
struct KeyStatistics {
    #[serde(rename = "trailingEps", default)]
    trailing_eps: Option<RawValue>,
    #[serde(rename = "priceToBook", default)]
    price_to_book: Option<RawValue>,
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

fn extract_history(item: &ChartItem) -> Vec<PricePoint> {
    let (Some(timestamps), Some(closes)) = (
        item.timestamp.as_ref(),
        item.indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return Vec::new();
    };

    let mut history: Vec<PricePoint> = timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            let close = to_decimal((*close)?)?;
            Some(PricePoint { date, close })
        })
        .collect();
    history.sort_by_key(|p| p.date);
    history.dedup_by_key(|p| p.date);
    history
}

fn build_snapshot(
    ticker: &TickerSymbol,
    item: QuoteSummaryItem,
    history: Vec<PricePoint>,
) -> Result<Snapshot, FetchError> {
    let price_module = item.price.unwrap_or_default();
    let financial = item.financial_data.unwrap_or_default();
    let statistics = item.key_statistics.unwrap_or_default();

    let price = RawValue::decimal(&financial.current_price)
        .or_else(|| RawValue::decimal(&price_module.regular_market_price));
    let eps = RawValue::decimal(&statistics.trailing_eps).unwrap_or(Decimal::ZERO);
    let pbv = RawValue::decimal(&statistics.price_to_book);
    let roe_percent = RawValue::decimal(&financial.return_on_equity)
        .filter(|roe| !roe.is_zero())
        .map(|roe| (roe * Decimal::ONE_HUNDRED).normalize());

    let mut snapshot = Snapshot {
        price,
        eps,
        pbv,
        roe_percent,
        history,
        short_name: price_module.short_name.or(price_module.long_name),
        currency: price_module.currency,
    };
    if snapshot.price.is_none() {
        snapshot.price = snapshot.last_close();
    }

    if !snapshot.is_processable() {
        return Err(FetchError::UnprocessableSnapshot {
            ticker: ticker.clone(),
        });
    }
    Ok(snapshot)
}

// YahooSnapshotProvider implementation for SnapshotProvider
//
// quoteSummary needs a session cookie (set by `cookie_url`, kept in the
// client's cookie jar) plus a matching crumb passed as a query parameter.
pub struct YahooSnapshotProvider {
    base_url: String,
    cookie_url: String,
    client: reqwest::Client,
    crumb: Mutex<Option<String>>,
    history_range: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl YahooSnapshotProvider {
    pub fn new(base_url: &str, fetch: &FetchConfig) -> Result<Self> {
        Ok(YahooSnapshotProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            client: http_client(fetch.timeout())?,
            crumb: Mutex::new(None),
            history_range: fetch.history_range.clone(),
            retries: fetch.retries,
            retry_delay_ms: fetch.retry_delay_ms,
        })
    }

    pub fn with_cookie_url(mut self, cookie_url: &str) -> Self {
        self.cookie_url = cookie_url.to_string();
        self
    }

    /// Returns the cached crumb, running the cookie and crumb handshake once
    /// if there is none. Concurrent callers wait on the same handshake.
    async fn crumb(&self, ticker: &TickerSymbol) -> Result<String, FetchError> {
        let mut crumb = self.crumb.lock().await;
        if let Some(value) = crumb.as_ref() {
            return Ok(value.clone());
        }
        let value = self.fetch_crumb(ticker).await?;
        *crumb = Some(value.clone());
        Ok(value)
    }

    async fn fetch_crumb(&self, ticker: &TickerSymbol) -> Result<String, FetchError> {
        debug!("Requesting Yahoo session cookie from {}", self.cookie_url);
        // The cookie endpoint usually answers 404; only the Set-Cookie matters.
        if let Err(e) = self
            .client
            .get(&self.cookie_url)
            .header(REFERER, FINANCE_REFERER)
            .send()
            .await
        {
            warn!(error = %e, "Failed to fetch Yahoo session cookie");
        }

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let (status, body) = self.get_text(ticker, &url).await?;
        let body = body.trim();
        let valid = status.is_success()
            && !body.is_empty()
            && body.len() < MAX_CRUMB_LEN
            && !body.contains(char::is_whitespace)
            && !body.contains('<');
        if !valid {
            return Err(FetchError::unavailable(
                ticker,
                format!("Failed to obtain Yahoo crumb: HTTP {status}"),
            ));
        }
        debug!("Obtained Yahoo crumb");
        Ok(body.to_string())
    }

    /// Forgets `stale` unless another request already replaced it.
    async fn invalidate_crumb(&self, stale: &str) {
        let mut crumb = self.crumb.lock().await;
        if crumb.as_deref() == Some(stale) {
            *crumb = None;
        }
    }

    fn summary_url(&self, ticker: &TickerSymbol, crumb: &str) -> String {
        format!(
            "{}/v10/finance/quoteSummary/{}?modules={}&crumb={}",
            self.base_url,
            encode(ticker.as_str()),
            SUMMARY_MODULES,
            encode(crumb)
        )
    }

    async fn get_text(&self, ticker: &TickerSymbol, url: &str) -> Result<(StatusCode, String), FetchError> {
        debug!("Requesting {}", url);
        let response = with_retry(
            || async { self.client.get(url).send().await },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .map_err(|e| FetchError::unavailable(ticker, format!("Request error: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::unavailable(ticker, format!("HTTP error: {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::unavailable(ticker, format!("Failed to read response: {e}")))?;
        Ok((status, text))
    }

    async fn fetch_summary(&self, ticker: &TickerSymbol) -> Result<QuoteSummaryItem, FetchError> {
        let crumb = self.crumb(ticker).await?;
        let (mut status, mut text) = self.get_text(ticker, &self.summary_url(ticker, &crumb)).await?;

        if status == StatusCode::UNAUTHORIZED {
            debug!("Yahoo rejected crumb, renewing session");
            self.invalidate_crumb(&crumb).await;
            let crumb = self.crumb(ticker).await?;
            (status, text) = self.get_text(ticker, &self.summary_url(ticker, &crumb)).await?;
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::unavailable(ticker, format!("HTTP error: {status}")));
        }

        let data: QuoteSummaryResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                FetchError::malformed(ticker, format!("Failed to parse quote summary: {e}"))
            } else {
                FetchError::malformed(ticker, format!("HTTP error: {status}"))
            }
        })?;

        if let Some(error) = data.quote_summary.error {
            let description = error
                .description
                .or(error.code)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(FetchError::malformed(ticker, description));
        }

        data.quote_summary
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| FetchError::malformed(ticker, "No quote summary result"))
    }

    async fn fetch_history(&self, ticker: &TickerSymbol) -> Result<Vec<PricePoint>, FetchError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range={}",
            self.base_url,
            encode(ticker.as_str()),
            encode(&self.history_range)
        );
        let (status, text) = self.get_text(ticker, &url).await?;
        if !status.is_success() {
            return Err(FetchError::malformed(ticker, format!("HTTP error: {status}")));
        }

        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::malformed(ticker, format!("Failed to parse chart: {e}")))?;

        Ok(data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| extract_history(&item))
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotProvider for YahooSnapshotProvider {
    #[instrument(
        name = "YahooSnapshotFetch",
        skip(self),
        fields(ticker = %ticker)
    )]
    async fn fetch_snapshot(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        let (summary, history) =
            tokio::join!(self.fetch_summary(ticker), self.fetch_history(ticker));

        let summary = summary?;
        let history = history.unwrap_or_else(|e| {
            warn!(error = %e, "Price history unavailable");
            Vec::new()
        });

        let snapshot = build_snapshot(ticker, summary, history)?;
        debug!(
            price = ?snapshot.price,
            eps = %snapshot.eps,
            points = snapshot.history.len(),
            "Fetched snapshot"
        );
        Ok(snapshot)
    }
}

// YahooSearchProvider implementation for SearchProvider
pub struct YahooSearchProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooSearchProvider {
    pub fn new(base_url: &str, fetch: &FetchConfig) -> Result<Self> {
        Ok(YahooSearchProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(fetch.timeout())?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<YahooSearchQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooSearchQuote {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    shortname: Option<String>,
    #[serde(default)]
    longname: Option<String>,
}

#[async_trait]
impl SearchProvider for YahooSearchProvider {
    #[instrument(name = "YahooSearch", skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/v1/finance/search?q={}&lang=en-US&quotesCount={}",
            self.base_url,
            encode(query),
            SEARCH_QUOTES_COUNT
        );
        debug!("Requesting search results from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for query: {}", e, query))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for query: {}",
                response.status(),
                query
            ));
        }

        let text = response.text().await?;
        let data: YahooSearchResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse search response for {query}"))?;

        Ok(data
            .quotes
            .into_iter()
            .filter_map(|quote| {
                let symbol = quote.symbol.filter(|s| !s.trim().is_empty())?;
                let name = quote
                    .shortname
                    .or(quote.longname)
                    .unwrap_or_else(|| symbol.clone());
                Some(SearchCandidate { symbol, name })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ticker(symbol: &str) -> TickerSymbol {
        TickerSymbol::parse(symbol).unwrap()
    }

    fn fetch_config() -> FetchConfig {
        FetchConfig {
            timeout_secs: 5,
            retries: 0,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    const TEST_CRUMB: &str = "Xy1.AbCdE/f";

    async fn mount_session(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=d=session; Path=/"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TEST_CRUMB))
            .mount(server)
            .await;
    }

    /// A provider pointed at `server`, with the session handshake mocked.
    async fn snapshot_provider(server: &MockServer) -> YahooSnapshotProvider {
        mount_session(server).await;
        YahooSnapshotProvider::new(&server.uri(), &fetch_config())
            .unwrap()
            .with_cookie_url(&format!("{}/cookie", server.uri()))
    }

    async fn mount_json(server: &MockServer, request_path: String, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    const SUMMARY_BBRI: &str = r#"{
        "quoteSummary": {
            "result": [{
                "price": {
                    "regularMarketPrice": {"raw": 4550.0, "fmt": "4,550.00"},
                    "currency": "IDR",
                    "shortName": "Bank Rakyat Indonesia"
                },
                "financialData": {
                    "currentPrice": {"raw": 4500.0, "fmt": "4,500.00"},
                    "returnOnEquity": {"raw": 0.1925, "fmt": "19.25%"}
                },
                "defaultKeyStatistics": {
                    "trailingEps": {"raw": 400.0, "fmt": "400.00"},
                    "priceToBook": {"raw": 1.2, "fmt": "1.20"}
                }
            }],
            "error": null
        }
    }"#;

    const CHART_BBRI: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"regularMarketPrice": 4550.0, "currency": "IDR"},
                "timestamp": [1717372800, 1717459200, 1717545600],
                "indicators": {"quote": [{"close": [4400.0, null, 4550.0]}]}
            }]
        }
    }"#;

    #[tokio::test]
    async fn test_successful_snapshot_fetch() {
        let server = MockServer::start().await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 200, SUMMARY_BBRI).await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = snapshot_provider(&server).await;
        let snapshot = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap();

        assert_eq!(snapshot.price, Some(Decimal::from(4500)));
        assert_eq!(snapshot.eps, Decimal::from(400));
        assert_eq!(snapshot.pbv, Some(Decimal::new(12, 1)));
        assert_eq!(snapshot.roe_percent, Some(Decimal::new(1925, 2)));
        assert_eq!(snapshot.currency.as_deref(), Some("IDR"));
        assert_eq!(snapshot.short_name.as_deref(), Some("Bank Rakyat Indonesia"));

        // The null close is skipped
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.last_close(), Some(Decimal::from(4550)));
        assert!(snapshot.history[0].date < snapshot.history[1].date);
    }

    #[tokio::test]
    async fn test_missing_fields_map_to_absent_and_eps_defaults_to_zero() {
        let server = MockServer::start().await;
        let summary = r#"{
            "quoteSummary": {
                "result": [{
                    "financialData": {"currentPrice": {"raw": 50.0}, "returnOnEquity": {}},
                    "defaultKeyStatistics": {"priceToBook": {}}
                }],
                "error": null
            }
        }"#;
        mount_json(&server, "/v10/finance/quoteSummary/GOTO.JK".into(), 200, summary).await;
        mount_json(&server, "/v8/finance/chart/GOTO.JK".into(), 200, r#"{"chart": {"result": []}}"#).await;

        let provider = snapshot_provider(&server).await;
        let snapshot = provider.fetch_snapshot(&ticker("GOTO.JK")).await.unwrap();

        assert_eq!(snapshot.price, Some(Decimal::from(50)));
        assert_eq!(snapshot.eps, Decimal::ZERO);
        assert_eq!(snapshot.pbv, None);
        assert_eq!(snapshot.roe_percent, None);
        assert!(snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn test_price_falls_back_to_last_close() {
        let server = MockServer::start().await;
        let summary = r#"{
            "quoteSummary": {
                "result": [{"defaultKeyStatistics": {"trailingEps": {"raw": 300.0}}}],
                "error": null
            }
        }"#;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 200, summary).await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = snapshot_provider(&server).await;
        let snapshot = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap();

        assert_eq!(snapshot.price, Some(Decimal::from(4550)));
        assert_eq!(snapshot.eps, Decimal::from(300));
    }

    #[tokio::test]
    async fn test_history_failure_degrades_to_empty_history() {
        let server = MockServer::start().await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 200, SUMMARY_BBRI).await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 500, "").await;

        let provider = snapshot_provider(&server).await;
        let snapshot = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap();

        assert_eq!(snapshot.price, Some(Decimal::from(4500)));
        assert!(snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn test_no_price_and_no_history_is_unprocessable() {
        let server = MockServer::start().await;
        let summary = r#"{"quoteSummary": {"result": [{}], "error": null}}"#;
        mount_json(&server, "/v10/finance/quoteSummary/DEAD.JK".into(), 200, summary).await;
        mount_json(&server, "/v8/finance/chart/DEAD.JK".into(), 200, r#"{"chart": {"result": []}}"#).await;

        let provider = snapshot_provider(&server).await;
        let err = provider.fetch_snapshot(&ticker("DEAD.JK")).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::UnprocessableSnapshot {
                ticker: ticker("DEAD.JK")
            }
        );
    }

    #[tokio::test]
    async fn test_quote_not_found_is_malformed() {
        let server = MockServer::start().await;
        let summary = r#"{
            "quoteSummary": {
                "result": null,
                "error": {"code": "Not Found", "description": "Quote not found for symbol: NOPE"}
            }
        }"#;
        mount_json(&server, "/v10/finance/quoteSummary/NOPE".into(), 404, summary).await;
        mount_json(&server, "/v8/finance/chart/NOPE".into(), 404, "").await;

        let provider = snapshot_provider(&server).await;
        let err = provider.fetch_snapshot(&ticker("NOPE")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed response for NOPE: Quote not found for symbol: NOPE"
        );
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let server = MockServer::start().await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 200, "<html>").await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = snapshot_provider(&server).await;
        let err = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
        assert!(err.to_string().contains("Failed to parse quote summary"));
    }

    #[tokio::test]
    async fn test_server_error_is_provider_unavailable() {
        let server = MockServer::start().await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 503, "").await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 503, "").await;

        let provider = snapshot_provider(&server).await;
        let err = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider unavailable for BBRI.JK: HTTP error: 503 Service Unavailable"
        );
    }

    #[tokio::test]
    async fn test_slow_provider_hits_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(SUMMARY_BBRI)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig {
            timeout_secs: 1,
            ..fetch_config()
        };
        let provider = YahooSnapshotProvider::new(&server.uri(), &config)
            .unwrap()
            .with_cookie_url(&format!("{}/cookie", server.uri()));
        let err = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap_err();
        assert!(matches!(err, FetchError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_crumb_is_fetched_once_and_sent_with_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=d=session; Path=/"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TEST_CRUMB))
            .expect(1)
            .mount(&server)
            .await;
        for symbol in ["BBRI.JK", "BBCA.JK"] {
            Mock::given(method("GET"))
                .and(path(format!("/v10/finance/quoteSummary/{symbol}")))
                .and(query_param("crumb", TEST_CRUMB))
                .respond_with(ResponseTemplate::new(200).set_body_string(SUMMARY_BBRI))
                .expect(1)
                .mount(&server)
                .await;
            mount_json(&server, format!("/v8/finance/chart/{symbol}"), 200, CHART_BBRI).await;
        }

        let provider = YahooSnapshotProvider::new(&server.uri(), &fetch_config())
            .unwrap()
            .with_cookie_url(&format!("{}/cookie", server.uri()));
        let bbri = ticker("BBRI.JK");
        let bbca = ticker("BBCA.JK");
        let (first, second) = tokio::join!(
            provider.fetch_snapshot(&bbri),
            provider.fetch_snapshot(&bbca)
        );
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_crumb_is_renewed_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("expired"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("renewed"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/BBRI.JK"))
            .and(query_param("crumb", "expired"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"finance":{"result":null,"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/BBRI.JK"))
            .and(query_param("crumb", "renewed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SUMMARY_BBRI))
            .expect(1)
            .mount(&server)
            .await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = YahooSnapshotProvider::new(&server.uri(), &fetch_config())
            .unwrap()
            .with_cookie_url(&format!("{}/cookie", server.uri()));
        let snapshot = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap();
        assert_eq!(snapshot.price, Some(Decimal::from(4500)));
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_is_provider_unavailable() {
        let server = MockServer::start().await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 401, r#"{"finance":{}}"#).await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = snapshot_provider(&server).await;
        let err = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider unavailable for BBRI.JK: HTTP error: 401 Unauthorized"
        );
    }

    #[tokio::test]
    async fn test_crumb_failure_is_provider_unavailable() {
        let server = MockServer::start().await;
        mount_json(&server, "/cookie".into(), 404, "").await;
        mount_json(&server, "/v1/test/getcrumb".into(), 200, "<html>blocked</html>").await;
        mount_json(&server, "/v10/finance/quoteSummary/BBRI.JK".into(), 200, SUMMARY_BBRI).await;
        mount_json(&server, "/v8/finance/chart/BBRI.JK".into(), 200, CHART_BBRI).await;

        let provider = YahooSnapshotProvider::new(&server.uri(), &fetch_config())
            .unwrap()
            .with_cookie_url(&format!("{}/cookie", server.uri()));
        let err = provider.fetch_snapshot(&ticker("BBRI.JK")).await.unwrap_err();
        assert!(matches!(err, FetchError::ProviderUnavailable { .. }));
        assert!(err.to_string().contains("Failed to obtain Yahoo crumb"));
    }

    #[tokio::test]
    async fn test_search_returns_candidates_with_symbols() {
        let server = MockServer::start().await;
        let body = r#"{
            "quotes": [
                {"symbol": "BBRI.JK", "shortname": "Bank Rakyat Indonesia (Persero) Tbk"},
                {"symbol": "BRIS.JK", "longname": "Bank Syariah Indonesia Tbk"},
                {"symbol": "BBRI"},
                {"index": "quicktake", "shortname": "News item"}
            ]
        }"#;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .and(query_param("q", "bank rakyat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = YahooSearchProvider::new(&server.uri(), &fetch_config()).unwrap();
        let results = provider.search("  bank rakyat ").await.unwrap();

        assert_eq!(
            results,
            vec![
                SearchCandidate {
                    symbol: "BBRI.JK".to_string(),
                    name: "Bank Rakyat Indonesia (Persero) Tbk".to_string()
                },
                SearchCandidate {
                    symbol: "BRIS.JK".to_string(),
                    name: "Bank Syariah Indonesia Tbk".to_string()
                },
                SearchCandidate {
                    symbol: "BBRI".to_string(),
                    name: "BBRI".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_search_empty_query_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"quotes": []}"#))
            .expect(0)
            .mount(&server)
            .await;

        let provider = YahooSearchProvider::new(&server.uri(), &fetch_config()).unwrap();
        assert!(provider.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = YahooSearchProvider::new(&server.uri(), &fetch_config()).unwrap();
        let err = provider.search("bbri").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "HTTP error: 500 Internal Server Error for query: bbri"
        );
    }
}
