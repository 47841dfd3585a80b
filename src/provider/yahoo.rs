use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{NameResolutionError, ProviderError};
use crate::model::{PriceBar, PriceSeries};
use crate::provider::PriceSeriesProvider;
use crate::resolver::SymbolNameResolver;

const PROVIDER: &str = "yahoo";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Yahoo Finance chart API client.
///
/// Serves both daily bars and the security's display name (from the chart
/// metadata), sharing one HTTP client and rate limiter.
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    base_url: String,
    symbol_suffix: String,
}

impl YahooProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, Report<ProviderError>> {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .change_context(ProviderError::Request {
                provider: PROVIDER.into(),
            })?;
        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            symbol_suffix: config.symbol_suffix.clone(),
        })
    }

    /// Listing symbol on the provider, e.g. `2330` -> `2330.TW`.
    ///
    /// Symbols that already carry an exchange suffix are left alone.
    pub fn listing_symbol(&self, symbol: &str) -> String {
        if symbol.contains('.') {
            symbol.to_owned()
        } else {
            format!("{symbol}{}", self.symbol_suffix)
        }
    }

    async fn get_chart(
        &self,
        listing: &str,
        params: &[(&str, String)],
    ) -> Result<String, Report<ProviderError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v8/finance/chart/{}", self.base_url, listing);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .change_context(ProviderError::Request {
                provider: PROVIDER.into(),
            })
            .attach_with(|| format!("url: {url}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Report::new(ProviderError::NoData {
                symbol: listing.to_owned(),
            })
            .attach(format!("HTTP status: {status}")));
        }
        if !status.is_success() {
            return Err(Report::new(ProviderError::Request {
                provider: PROVIDER.into(),
            })
            .attach(format!("HTTP status: {status}")));
        }

        response
            .text()
            .await
            .change_context(ProviderError::ResponseParse {
                provider: PROVIDER.into(),
            })
    }
}

impl PriceSeriesProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
    ) -> BoxFuture<'_, Result<PriceSeries, Report<ProviderError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let listing = self.listing_symbol(&symbol);
            let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
            let period2 = Utc::now().timestamp();
            let params = [
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_owned()),
            ];

            let body = self.get_chart(&listing, &params).await?;
            let series = parse_chart(&symbol, &body)?;

            info!(
                symbol = %symbol,
                listing = %listing,
                fetched = series.len(),
                "yahoo daily bars fetch complete"
            );
            Ok(series)
        })
    }
}

impl SymbolNameResolver for YahooProvider {
    fn strategy(&self) -> &str {
        PROVIDER
    }

    fn resolve(&self, symbol: &str) -> BoxFuture<'_, Result<String, Report<NameResolutionError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let error = || NameResolutionError {
                symbol: symbol.clone(),
                strategy: PROVIDER.into(),
            };
            let listing = self.listing_symbol(&symbol);
            let params = [("range", "5d".to_owned()), ("interval", "1d".to_owned())];
            let body = self
                .get_chart(&listing, &params)
                .await
                .change_context_lazy(error)?;
            let name = parse_display_name(&body)
                .ok_or_else(|| Report::new(error()).attach("chart metadata has no name"))?;
            debug!(symbol = %symbol, name = %name, "resolved display name");
            Ok(name)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    /// Seconds east of UTC for the listing exchange.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_response(body: &str) -> Result<ChartResult, Report<ProviderError>> {
    let response: ChartResponse =
        serde_json::from_str(body).change_context(ProviderError::ResponseParse {
            provider: PROVIDER.into(),
        })?;

    if let Some(error) = response.chart.error {
        return Err(Report::new(ProviderError::NoData {
            symbol: String::new(),
        })
        .attach(format!(
            "yahoo chart API error: {} {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| {
            Report::new(ProviderError::ResponseParse {
                provider: PROVIDER.into(),
            })
            .attach("no chart result in response")
        })
}

/// Convert a chart response into a series of exchange-local daily bars.
///
/// Rows with a missing OHLC value are skipped; when two rows fall on the
/// same date the later one wins.
fn parse_chart(symbol: &str, body: &str) -> Result<PriceSeries, Report<ProviderError>> {
    let no_data = || ProviderError::NoData {
        symbol: symbol.to_owned(),
    };
    let result = parse_response(body).map_err(|report| {
        if matches!(report.current_context(), ProviderError::NoData { .. }) {
            report.change_context(no_data())
        } else {
            report
        }
    })?;

    let Some(quote) = result.indicators.quote.first() else {
        return Err(Report::new(no_data()).attach("no quote data"));
    };

    let mut by_date = BTreeMap::new();
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let field = |v: &[Option<f64>]| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open[..]),
            field(&quote.high[..]),
            field(&quote.low[..]),
            field(&quote.close[..]),
        ) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0)
            .map(|dt| dt.date_naive())
        else {
            continue;
        };
        let volume = field(&quote.volume[..]).map_or(0, |v| v.max(0.0) as u64);
        by_date.insert(
            date,
            PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            },
        );
    }

    if by_date.is_empty() {
        return Err(Report::new(no_data()).attach("chart response has no complete bars"));
    }

    PriceSeries::new(symbol, by_date.into_values().collect())
}

fn parse_display_name(body: &str) -> Option<String> {
    let meta = parse_response(body).ok()?.meta;
    [meta.long_name, meta.short_name]
        .into_iter()
        .flatten()
        .map(|n| n.trim().to_owned())
        .find(|n| !n.is_empty())
}
