use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, DEFAULT_TIMEOUT_MS};
use crate::provider::{MarketDataProvider, ProviderFuture, SourceError};
use crate::throttling::RequestThrottle;
use crate::{Granularity, Period, PriceSeries, QuoteSnapshot, Symbol};

const REFERER: &str = "https://finance.yahoo.com/";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const SPARK_URL: &str = "https://query1.finance.yahoo.com/v7/finance/spark";

// ============================================================================
// Yahoo Auth Manager - cookie/crumb session
// ============================================================================

#[derive(Debug, Default)]
struct AuthState {
    crumb: Option<String>,
    refreshed_at: Option<Instant>,
}

/// Caches the crumb token Yahoo requires on query endpoints.
///
/// The session cookie itself lives in the HTTP client's cookie jar; only the
/// crumb is tracked here. Refreshes are serialized by the state lock, so
/// concurrent callers wait for one refresh instead of racing.
#[derive(Debug)]
pub struct YahooAuthManager {
    state: Mutex<AuthState>,
    ttl: Duration,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }
}

impl YahooAuthManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(AuthState::default()),
            ttl,
        }
    }

    /// Current crumb, refreshing the session when missing or expired.
    pub async fn crumb(
        &self,
        http_client: &dyn HttpClient,
        timeout_ms: u64,
    ) -> Result<String, SourceError> {
        let mut state = self.state.lock().await;
        let fresh = state
            .refreshed_at
            .is_some_and(|refreshed_at| refreshed_at.elapsed() < self.ttl);
        if let (true, Some(crumb)) = (fresh, state.crumb.as_ref()) {
            return Ok(crumb.clone());
        }

        let crumb = fetch_crumb(http_client, timeout_ms).await?;
        state.crumb = Some(crumb.clone());
        state.refreshed_at = Some(Instant::now());
        tracing::debug!("refreshed yahoo crumb");
        Ok(crumb)
    }

    /// Drop the cached crumb so the next call refreshes the session.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.crumb = None;
        state.refreshed_at = None;
    }
}

async fn fetch_crumb(http_client: &dyn HttpClient, timeout_ms: u64) -> Result<String, SourceError> {
    // fc.yahoo.com answers 404 but still sets the session cookie.
    let cookie_request = HttpRequest::get(COOKIE_URL)
        .with_header("referer", REFERER)
        .with_timeout_ms(timeout_ms);
    http_client.execute(cookie_request).await.map_err(|e| {
        SourceError::unavailable(format!("failed to fetch yahoo cookie: {}", e.message()))
    })?;

    for endpoint in CRUMB_URLS {
        let crumb_request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms);

        let Ok(response) = http_client.execute(crumb_request).await else {
            continue;
        };
        if response.status == 429 {
            return Err(SourceError::rate_limited(
                "yahoo rate limited while fetching crumb",
            ));
        }
        if !response.is_success() {
            continue;
        }

        let body = response.body.trim();
        if body.to_ascii_lowercase().contains("too many requests") {
            return Err(SourceError::rate_limited(
                "yahoo rate limited while fetching crumb",
            ));
        }
        let looks_like_crumb = !body.is_empty()
            && body.len() < 100
            && !body.contains(char::is_whitespace)
            && !body.contains('<');
        if looks_like_crumb {
            return Ok(body.to_owned());
        }
    }

    Err(SourceError::unavailable(
        "failed to fetch yahoo crumb from all endpoints",
    ))
}

// ============================================================================
// Yahoo Provider
// ============================================================================

/// Yahoo Finance provider over the unofficial chart, quote and spark endpoints.
#[derive(Clone)]
pub struct YahooProvider {
    http_client: Arc<dyn HttpClient>,
    auth_manager: Arc<YahooAuthManager>,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: RequestThrottle,
    timeout_ms: u64,
}

impl YahooProvider {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        circuit_breaker: Arc<CircuitBreaker>,
        throttle: RequestThrottle,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http_client,
            auth_manager: Arc::new(YahooAuthManager::default()),
            circuit_breaker,
            throttle,
            timeout_ms,
        }
    }

    /// Provider with default breaker and a generous request budget.
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(
            http_client,
            Arc::new(CircuitBreaker::default()),
            RequestThrottle::per_minute(600),
            DEFAULT_TIMEOUT_MS,
        )
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Perform one crumb-authenticated GET and return the body of a 2xx answer.
    ///
    /// A 401/429 invalidates the crumb and retries once with a fresh one.
    /// Client errors other than 429 describe the request, not upstream
    /// health, and leave the breaker closed. `source` names the symbols the
    /// request is for when a failure is charged to the breaker.
    async fn fetch(
        &self,
        source: &str,
        url_for: impl Fn(&str) -> String,
    ) -> Result<String, SourceError> {
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::unavailable("yahoo circuit breaker is open"));
        }
        self.throttle.acquire().await;

        let crumb = self.crumb(source).await?;
        let mut response = self.send(source, url_for(&crumb)).await?;

        if response.status == 401 || response.status == 429 {
            tracing::debug!(status = response.status, "yahoo rejected crumb, refreshing");
            self.auth_manager.invalidate().await;
            let crumb = self.crumb(source).await?;
            self.throttle.acquire().await;
            response = self.send(source, url_for(&crumb)).await?;
        }

        match response.status {
            status if (200..300).contains(&status) => {
                self.circuit_breaker.record_success();
                Ok(response.body)
            }
            404 => {
                self.circuit_breaker.record_success();
                Err(SourceError::invalid_request("yahoo has no data for request"))
            }
            429 => {
                self.circuit_breaker.record_failure(source);
                Err(SourceError::rate_limited(
                    "yahoo returned status 429 after auth refresh",
                ))
            }
            status if (400..500).contains(&status) && status != 401 => {
                self.circuit_breaker.record_success();
                Err(SourceError::invalid_request(format!(
                    "yahoo rejected request with status {status}"
                )))
            }
            status => {
                self.circuit_breaker.record_failure(source);
                Err(SourceError::unavailable(format!(
                    "yahoo returned status {status}"
                )))
            }
        }
    }

    async fn crumb(&self, source: &str) -> Result<String, SourceError> {
        self.auth_manager
            .crumb(self.http_client.as_ref(), self.timeout_ms)
            .await
            .inspect_err(|_| self.circuit_breaker.record_failure(source))
    }

    async fn send(&self, source: &str, url: String) -> Result<HttpResponse, SourceError> {
        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms);

        self.http_client.execute(request).await.map_err(|e| {
            self.circuit_breaker.record_failure(source);
            SourceError::unavailable(format!("yahoo transport error: {}", e.message()))
        })
    }

    async fn fetch_history(
        &self,
        symbol: &Symbol,
        period: Period,
        granularity: Granularity,
    ) -> Result<PriceSeries, SourceError> {
        let body = self
            .fetch(symbol.as_str(), |crumb| {
                format!(
                    "{CHART_URL}/{}?range={}&interval={}&crumb={}",
                    urlencoding::encode(symbol.as_str()),
                    period,
                    granularity,
                    urlencoding::encode(crumb)
                )
            })
            .await?;

        parse_chart(&body)
    }

    async fn fetch_quote_snapshot(&self, symbol: &Symbol) -> Result<QuoteSnapshot, SourceError> {
        let body = self
            .fetch(symbol.as_str(), |crumb| {
                format!(
                    "{QUOTE_URL}?symbols={}&crumb={}",
                    urlencoding::encode(symbol.as_str()),
                    urlencoding::encode(crumb)
                )
            })
            .await?;

        parse_quote(&body, symbol)
    }

    async fn fetch_batch_history(
        &self,
        symbols: &[Symbol],
        period: Period,
        granularity: Granularity,
    ) -> Result<BTreeMap<Symbol, PriceSeries>, SourceError> {
        if symbols.is_empty() {
            return Err(SourceError::invalid_request(
                "yahoo batch request must include at least one symbol",
            ));
        }

        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .fetch(&joined, |crumb| {
                format!(
                    "{SPARK_URL}?symbols={}&range={}&interval={}&crumb={}",
                    urlencoding::encode(&joined),
                    period,
                    granularity,
                    urlencoding::encode(crumb)
                )
            })
            .await?;

        parse_spark(&body)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn history<'a>(
        &'a self,
        symbol: &'a Symbol,
        period: Period,
        granularity: Granularity,
    ) -> ProviderFuture<'a, PriceSeries> {
        Box::pin(self.fetch_history(symbol, period, granularity))
    }

    fn quote_snapshot<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, QuoteSnapshot> {
        Box::pin(self.fetch_quote_snapshot(symbol))
    }

    fn batch_history<'a>(
        &'a self,
        symbols: &'a [Symbol],
        period: Period,
        granularity: Granularity,
    ) -> ProviderFuture<'a, BTreeMap<Symbol, PriceSeries>> {
        Box::pin(self.fetch_batch_history(symbols, period, granularity))
    }
}

// Yahoo Finance API response structures
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<YahooChartIndicators>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResponseData,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResponseData {
    #[serde(default)]
    result: Vec<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct YahooSparkResponse {
    spark: YahooSparkData,
}

#[derive(Debug, Deserialize)]
struct YahooSparkData {
    #[serde(default)]
    result: Option<Vec<YahooSparkResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YahooSparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<YahooChartResult>,
}

impl YahooChartResult {
    fn into_series(self) -> PriceSeries {
        let closes = self
            .indicators
            .and_then(|indicators| indicators.quote.into_iter().next())
            .map(|quote| quote.close)
            .unwrap_or_default();

        PriceSeries {
            timestamps: self.timestamp.unwrap_or_default(),
            closes,
        }
    }
}

fn api_error(error: Option<&serde_json::Value>) -> Option<String> {
    match error? {
        serde_json::Value::Null => None,
        serde_json::Value::String(message) if message.is_empty() => None,
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(
            other
                .get("description")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

fn parse_chart(body: &str) -> Result<PriceSeries, SourceError> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(message) = api_error(response.chart.error.as_ref()) {
        return Err(SourceError::unavailable(format!(
            "yahoo chart API error: {message}"
        )));
    }

    Ok(response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(YahooChartResult::into_series)
        .unwrap_or_default())
}

fn parse_quote(body: &str, symbol: &Symbol) -> Result<QuoteSnapshot, SourceError> {
    let response: YahooQuoteResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo quote: {e}")))?;

    Ok(response
        .quote_response
        .result
        .into_iter()
        .find(|entry| {
            entry
                .get("symbol")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|value| value.eq_ignore_ascii_case(symbol.as_str()))
        })
        .unwrap_or_default())
}

fn parse_spark(body: &str) -> Result<BTreeMap<Symbol, PriceSeries>, SourceError> {
    let response: YahooSparkResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo spark: {e}")))?;

    if let Some(message) = api_error(response.spark.error.as_ref()) {
        return Err(SourceError::unavailable(format!(
            "yahoo spark API error: {message}"
        )));
    }

    let mut series = BTreeMap::new();
    for entry in response.spark.result.unwrap_or_default() {
        let Ok(symbol) = Symbol::parse(&entry.symbol) else {
            tracing::debug!(symbol = %entry.symbol, "skipping unparseable spark symbol");
            continue;
        };
        if let Some(result) = entry.response.into_iter().next() {
            series.insert(symbol, result.into_series());
        }
    }

    Ok(series)
}
