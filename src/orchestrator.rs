//! Runs chart requests end to end: name, prices, indicator, image, URL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt};
use futures::future::join_all;
use tracing::info;

use crate::config::{AppConfig, IndicatorsConfig};
use crate::error::{ChartError, ConfigError, ProviderError, UploadError};
use crate::host::ImageHost;
use crate::indicator::build_indicator;
use crate::model::{IndicatorKind, PriceSeries};
use crate::provider::PriceSeriesProvider;
use crate::render::{ChartLabels, ChartRenderer};
use crate::resolver::ResolverChain;
use crate::retry::{RetryPolicy, retry};

/// One chart to produce.
#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub symbol: String,
    pub indicator: IndicatorKind,
    /// Image file stem inside the output directory.
    pub output_name: String,
}

impl ChartRequest {
    /// Request with the default output name `{symbol}_{indicator}`.
    pub fn new(symbol: impl Into<String>, indicator: IndicatorKind) -> Self {
        let symbol = symbol.into();
        let output_name = format!("{symbol}_{indicator}");
        Self {
            symbol,
            indicator,
            output_name,
        }
    }

    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub output_dir: PathBuf,
    /// First date of the fetched history; the end is always today.
    pub start_date: NaiveDate,
    pub x_label: String,
    pub retry: RetryPolicy,
    pub indicators: IndicatorsConfig,
}

impl ChartSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Report<ConfigError>> {
        Ok(Self {
            output_dir: PathBuf::from(&config.general.output_dir),
            start_date: config.general.start_date()?,
            x_label: config.chart.x_label.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            indicators: config.indicators.clone(),
        })
    }
}

pub struct ChartService {
    names: ResolverChain,
    provider: Arc<dyn PriceSeriesProvider>,
    renderer: Arc<dyn ChartRenderer>,
    host: Arc<dyn ImageHost>,
    settings: ChartSettings,
}

impl ChartService {
    pub fn new(
        names: ResolverChain,
        provider: Arc<dyn PriceSeriesProvider>,
        renderer: Arc<dyn ChartRenderer>,
        host: Arc<dyn ImageHost>,
        settings: ChartSettings,
    ) -> Self {
        Self {
            names,
            provider,
            renderer,
            host,
            settings,
        }
    }

    /// Produce each requested chart and return its URL, concurrently; results
    /// keep request order. Requests for the same symbol share one name lookup
    /// and one price fetch. Any failure after name lookup aborts that request
    /// and no partial chart is uploaded.
    pub async fn run_all(
        &self,
        requests: Vec<ChartRequest>,
    ) -> Vec<(ChartRequest, Result<String, Report<ChartError>>)> {
        let mut symbols: Vec<&str> = Vec::new();
        for request in &requests {
            if !symbols.contains(&request.symbol.as_str()) {
                symbols.push(&request.symbol);
            }
        }
        let fetched = join_all(symbols.iter().map(|symbol| self.history(symbol))).await;
        // the first request of a symbol reports the fetch failure in full
        let mut shared: HashMap<String, Result<History, Option<Report<ChartError>>>> = symbols
            .iter()
            .map(|symbol| (*symbol).to_owned())
            .zip(fetched.into_iter().map(|result| result.map_err(Some)))
            .collect();

        let jobs: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let history = match shared.get_mut(&request.symbol) {
                    Some(Ok(history)) => Ok(history.clone()),
                    Some(Err(first)) => Err(first
                        .take()
                        .unwrap_or_else(|| fetch_already_failed(&request.symbol))),
                    None => Err(fetch_already_failed(&request.symbol)),
                };
                (request, history)
            })
            .collect();

        join_all(jobs.into_iter().map(|(request, history)| async move {
            let result = match history {
                Ok(history) => self.chart(&request, &history).await,
                Err(report) => Err(report),
            };
            (request, result)
        }))
        .await
    }

    /// Display name and non-empty price history of `symbol`.
    async fn history(&self, symbol: &str) -> Result<History, Report<ChartError>> {
        let name = self.names.display_name(symbol).await;

        let start = self.settings.start_date;
        let series = retry(
            self.settings.retry,
            "fetch",
            |e: &ProviderError| !matches!(e, ProviderError::NoData { .. }),
            || self.provider.fetch(symbol, start),
        )
        .await
        .change_context_lazy(|| ChartError::Fetch {
            symbol: symbol.to_owned(),
        })
        .attach_with(|| format!("provider: {}", self.provider.name()))?;
        if series.is_empty() {
            return Err(Report::new(ChartError::Fetch {
                symbol: symbol.to_owned(),
            })
            .attach(format!("no bars since {start}")));
        }
        info!(
            symbol = series.symbol(),
            bars = series.len(),
            provider = self.provider.name(),
            "prices fetched"
        );

        Ok(History {
            name,
            series: Arc::new(series),
        })
    }

    /// Compute, render and publish one chart from fetched history.
    async fn chart(
        &self,
        request: &ChartRequest,
        history: &History,
    ) -> Result<String, Report<ChartError>> {
        let symbol = request.symbol.as_str();
        let indicator = request.indicator.as_str();

        let compute_failed = || ChartError::Compute {
            symbol: symbol.to_owned(),
            indicator: indicator.to_owned(),
        };
        let engine = build_indicator(request.indicator, &self.settings.indicators)
            .change_context_lazy(compute_failed)?;
        let output = engine
            .compute(&history.series)
            .change_context_lazy(compute_failed)?;
        info!(
            symbol,
            indicator = %engine.kind(),
            points = output.len(),
            defined = output.defined_len(),
            "indicator computed"
        );

        let labels = ChartLabels {
            title: format!("{} {}", history.name, request.indicator.title_suffix()),
            x_label: self.settings.x_label.clone(),
            y_label: request.indicator.y_label().to_owned(),
        };
        let path = self.settings.output_dir.join(format!(
            "{}.{}",
            request.output_name,
            self.renderer.extension()
        ));
        self.renderer
            .render(&output, &labels, &path)
            .await
            .change_context_lazy(|| ChartError::Render {
                symbol: symbol.to_owned(),
                indicator: indicator.to_owned(),
            })?;

        let url = retry(
            self.settings.retry,
            "upload",
            |e: &UploadError| !matches!(e, UploadError::ReadArtifact),
            || self.host.upload(&path),
        )
        .await
        .change_context_lazy(|| ChartError::Upload {
            symbol: symbol.to_owned(),
            indicator: indicator.to_owned(),
        })
        .attach_with(|| format!("image kept at {}", path.display()))?;
        info!(symbol, indicator, host = self.host.name(), url = %url, "chart published");

        Ok(url)
    }
}

/// Name and prices fetched once per symbol.
#[derive(Clone)]
struct History {
    name: String,
    series: Arc<PriceSeries>,
}

fn fetch_already_failed(symbol: &str) -> Report<ChartError> {
    Report::new(ChartError::Fetch {
        symbol: symbol.to_owned(),
    })
    .attach("price history fetch failed for an earlier request of this symbol")
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::BoxFuture;

    use super::*;
    use crate::error::RenderError;
    use crate::indicator::test_support::series_from_closes;
    use crate::model::IndicatorSeries;
    use crate::resolver::test_support::FixedResolver;
    use crate::retry::Backoff;

    enum Feed {
        Closes(Vec<f64>),
        NoData,
    }

    struct FakeProvider {
        feed: Feed,
        transient_failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(feed: Feed) -> Arc<Self> {
            Self::flaky(feed, 0)
        }

        fn flaky(feed: Feed, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                feed,
                transient_failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl PriceSeriesProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(
            &self,
            symbol: &str,
            _start: NaiveDate,
        ) -> BoxFuture<'_, Result<PriceSeries, Report<ProviderError>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(Report::new(ProviderError::Request {
                    provider: "fake".into(),
                }))
            } else {
                match &self.feed {
                    Feed::Closes(closes) => Ok(series_from_closes(closes)),
                    Feed::NoData => Err(Report::new(ProviderError::NoData {
                        symbol: symbol.to_owned(),
                    })),
                }
            };
            Box::pin(async move { result })
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        fail: bool,
        rendered: Mutex<Vec<(ChartLabels, PathBuf, usize)>>,
    }

    impl FakeRenderer {
        fn count(&self) -> usize {
            self.rendered.lock().unwrap().len()
        }
    }

    impl ChartRenderer for FakeRenderer {
        fn extension(&self) -> &str {
            "png"
        }

        fn render<'a>(
            &'a self,
            series: &'a IndicatorSeries,
            labels: &'a ChartLabels,
            output: &'a Path,
        ) -> BoxFuture<'a, Result<(), Report<RenderError>>> {
            let result = if self.fail {
                Err(Report::new(RenderError::Write))
            } else {
                self.rendered.lock().unwrap().push((
                    labels.clone(),
                    output.to_owned(),
                    series.components.len(),
                ));
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    struct FakeHost {
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeHost {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ImageHost for FakeHost {
        fn name(&self) -> &str {
            "fake"
        }

        fn upload(&self, path: &Path) -> BoxFuture<'_, Result<String, Report<UploadError>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(Report::new(UploadError::Unreachable {
                    host: "fake".into(),
                }))
            } else {
                let file = path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(format!("https://img.test/{file}"))
            };
            Box::pin(async move { result })
        }
    }

    fn settings(max_retries: u32) -> ChartSettings {
        ChartSettings {
            output_dir: PathBuf::from("out"),
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            x_label: "Date".into(),
            retry: RetryPolicy {
                max_retries,
                backoff: Backoff::Fixed(Duration::ZERO),
            },
            indicators: IndicatorsConfig::default(),
        }
    }

    async fn run_one(
        svc: &ChartService,
        request: ChartRequest,
    ) -> Result<String, Report<ChartError>> {
        let (_, result) = svc.run_all(vec![request]).await.pop().unwrap();
        result
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect()
    }

    fn service(
        names: ResolverChain,
        provider: Arc<FakeProvider>,
        renderer: Arc<FakeRenderer>,
        host: Arc<FakeHost>,
        max_retries: u32,
    ) -> ChartService {
        ChartService::new(names, provider, renderer, host, settings(max_retries))
    }

    #[tokio::test]
    async fn happy_path_returns_url_and_titles_chart_with_display_name() {
        let renderer = Arc::new(FakeRenderer::default());
        let svc = service(
            ResolverChain::new(vec![FixedResolver::ok("台積電")]),
            FakeProvider::new(Feed::Closes(closes(60))),
            renderer.clone(),
            FakeHost::new(0),
            0,
        );

        let url = run_one(&svc, ChartRequest::new("2330", IndicatorKind::Macd))
            .await
            .unwrap();
        assert_eq!(url, "https://img.test/2330_macd.png");

        let rendered = renderer.rendered.lock().unwrap();
        let (labels, path, components) = &rendered[0];
        assert_eq!(labels.title, "台積電 MACD");
        assert_eq!(labels.x_label, "Date");
        assert_eq!(labels.y_label, "Value");
        assert_eq!(path, &PathBuf::from("out/2330_macd.png"));
        assert_eq!(*components, 3);
    }

    #[tokio::test]
    async fn name_lookup_failure_falls_back_to_symbol() {
        let renderer = Arc::new(FakeRenderer::default());
        let svc = service(
            ResolverChain::new(vec![FixedResolver::failing()]),
            FakeProvider::new(Feed::Closes(closes(30))),
            renderer.clone(),
            FakeHost::new(0),
            0,
        );

        run_one(&svc, ChartRequest::new("2330", IndicatorKind::Rsi))
            .await
            .unwrap();
        let rendered = renderer.rendered.lock().unwrap();
        assert_eq!(rendered[0].0.title, "2330 RSI");
        assert_eq!(rendered[0].0.y_label, "RSI");
    }

    #[tokio::test]
    async fn custom_output_name_keys_the_image() {
        let renderer = Arc::new(FakeRenderer::default());
        let svc = service(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(closes(30))),
            renderer.clone(),
            FakeHost::new(0),
            0,
        );

        let request =
            ChartRequest::new("2330", IndicatorKind::Bollinger).with_output_name("tsmc_bands");
        let url = run_one(&svc, request).await.unwrap();
        assert_eq!(url, "https://img.test/tsmc_bands.png");
        assert_eq!(
            renderer.rendered.lock().unwrap()[0].1,
            PathBuf::from("out/tsmc_bands.png")
        );
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_retried_and_nothing_is_rendered() {
        let provider = FakeProvider::new(Feed::NoData);
        let renderer = Arc::new(FakeRenderer::default());
        let host = FakeHost::new(0);
        let svc = service(
            ResolverChain::default(),
            provider.clone(),
            renderer.clone(),
            host.clone(),
            3,
        );

        let err = run_one(&svc, ChartRequest::new("0000", IndicatorKind::Macd))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChartError::Fetch { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.count(), 0);
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_fetch_failure_is_retried() {
        let provider = FakeProvider::flaky(Feed::Closes(closes(30)), 2);
        let svc = service(
            ResolverChain::default(),
            provider.clone(),
            Arc::new(FakeRenderer::default()),
            FakeHost::new(0),
            2,
        );

        run_one(&svc, ChartRequest::new("2330", IndicatorKind::Rsi))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_series_aborts_before_rendering() {
        let renderer = Arc::new(FakeRenderer::default());
        let svc = service(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(Vec::new())),
            renderer.clone(),
            FakeHost::new(0),
            0,
        );

        let err = run_one(&svc, ChartRequest::new("2330", IndicatorKind::Bollinger))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChartError::Fetch { .. }));
        assert_eq!(renderer.count(), 0);
    }

    #[tokio::test]
    async fn invalid_parameters_fail_the_compute_stage() {
        let renderer = Arc::new(FakeRenderer::default());
        let mut settings = settings(0);
        settings.indicators.rsi.period = 0;
        let svc = ChartService::new(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(closes(30))),
            renderer.clone(),
            FakeHost::new(0),
            settings,
        );

        let err = run_one(&svc, ChartRequest::new("2330", IndicatorKind::Rsi))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChartError::Compute { .. }));
        assert_eq!(renderer.count(), 0);
    }

    #[tokio::test]
    async fn render_failure_skips_upload() {
        let host = FakeHost::new(0);
        let svc = service(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(closes(30))),
            Arc::new(FakeRenderer {
                fail: true,
                ..Default::default()
            }),
            host.clone(),
            0,
        );

        let err = run_one(&svc, ChartRequest::new("2330", IndicatorKind::Macd))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChartError::Render { .. }));
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_failure_after_retries_is_reported() {
        let host = FakeHost::new(5);
        let svc = service(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(closes(30))),
            Arc::new(FakeRenderer::default()),
            host.clone(),
            1,
        );

        let err = run_one(&svc, ChartRequest::new("2330", IndicatorKind::Macd))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ChartError::Upload { .. }));
        assert_eq!(host.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_all_reports_each_request_independently() {
        let mut settings = settings(0);
        settings.indicators.macd.slow = 0;
        let svc = ChartService::new(
            ResolverChain::default(),
            FakeProvider::new(Feed::Closes(closes(40))),
            Arc::new(FakeRenderer::default()),
            FakeHost::new(0),
            settings,
        );

        let requests = IndicatorKind::ALL
            .iter()
            .map(|&kind| ChartRequest::new("2330", kind))
            .collect();
        let results = svc.run_all(requests).await;

        assert_eq!(results.len(), 3);
        for (request, result) in &results {
            match request.indicator {
                IndicatorKind::Macd => assert!(result.is_err()),
                _ => assert!(result.is_ok()),
            }
        }
    }

    #[tokio::test]
    async fn same_symbol_requests_share_one_fetch() {
        let provider = FakeProvider::new(Feed::Closes(closes(40)));
        let resolver = FixedResolver::ok("台積電");
        let renderer = Arc::new(FakeRenderer::default());
        let svc = service(
            ResolverChain::new(vec![resolver.clone()]),
            provider.clone(),
            renderer.clone(),
            FakeHost::new(0),
            0,
        );

        let mut requests: Vec<_> = IndicatorKind::ALL
            .iter()
            .map(|&kind| ChartRequest::new("2330", kind))
            .collect();
        requests.push(ChartRequest::new("0050", IndicatorKind::Rsi));
        let results = svc.run_all(requests).await;

        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.calls(), 2);
        assert_eq!(renderer.rendered.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failed_fetch_fails_every_request_of_that_symbol() {
        let provider = FakeProvider::new(Feed::NoData);
        let host = FakeHost::new(0);
        let svc = service(
            ResolverChain::default(),
            provider.clone(),
            Arc::new(FakeRenderer::default()),
            host.clone(),
            2,
        );

        let requests = IndicatorKind::ALL
            .iter()
            .map(|&kind| ChartRequest::new("9999", kind))
            .collect();
        let results = svc.run_all(requests).await;

        assert_eq!(results.len(), 3);
        for (_, result) in &results {
            let err = result.as_ref().unwrap_err();
            assert!(matches!(
                err.current_context(),
                ChartError::Fetch { symbol } if symbol == "9999"
            ));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_output_name_joins_symbol_and_indicator() {
        let request = ChartRequest::new("2330", IndicatorKind::Bollinger);
        assert_eq!(request.output_name, "2330_bollinger");
    }
}
