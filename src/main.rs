mod config;
mod error;
mod host;
mod indicator;
mod model;
mod orchestrator;
mod provider;
mod render;
mod resolver;
mod retry;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use host::ImageHost;
use host::imgur::ImgurHost;
use host::local::LocalHost;
use model::IndicatorKind;
use orchestrator::{ChartRequest, ChartService, ChartSettings};
use provider::yahoo::YahooProvider;
use render::png::PngChartRenderer;
use resolver::web_page::WebPageResolver;
use resolver::{ResolverChain, SymbolNameResolver};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("invalid arguments")]
    Usage,
    #[display("failed to set up {component}")]
    Setup { component: String },
    #[display("{failed} of {total} chart requests failed")]
    Requests { failed: usize, total: usize },
}

#[derive(Parser)]
#[command(
    name = "ta-chart",
    about = "Technical-indicator charts for listed securities"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Security symbol, e.g. 2330
    symbol: String,

    /// Indicator to chart (macd, rsi, bollinger); repeatable, defaults to all
    #[arg(short, long = "indicator")]
    indicators: Vec<String>,

    /// Output file stem; only valid with a single indicator
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let requests = build_requests(&cli)?;
    let service = build_service(&config)?;

    info!(
        symbol = %cli.symbol,
        requests = requests.len(),
        "generating charts"
    );

    let total = requests.len();
    let mut failed = 0;
    for (request, result) in service.run_all(requests).await {
        match result {
            Ok(url) => println!("{}: {url}", request.indicator),
            Err(e) => {
                failed += 1;
                error!(
                    symbol = %request.symbol,
                    indicator = %request.indicator,
                    error = ?e,
                    "chart request failed"
                );
            }
        }
    }

    if failed > 0 {
        return Err(Report::new(AppError::Requests { failed, total }));
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_requests(cli: &Cli) -> Result<Vec<ChartRequest>, Report<AppError>> {
    let mut kinds = Vec::new();
    for raw in &cli.indicators {
        let kind = IndicatorKind::parse(raw).ok_or_else(|| {
            Report::new(AppError::Usage).attach(format!(
                "unknown indicator \"{raw}\" (expected macd, rsi or bollinger)"
            ))
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        kinds.extend(IndicatorKind::ALL);
    }

    match (&cli.output, kinds.len()) {
        (Some(_), n) if n != 1 => Err(Report::new(AppError::Usage)
            .attach("--output can only be used with a single --indicator")),
        (output, _) => Ok(kinds
            .into_iter()
            .map(|kind| {
                let request = ChartRequest::new(&cli.symbol, kind);
                match output {
                    Some(name) => request.with_output_name(name),
                    None => request,
                }
            })
            .collect()),
    }
}

fn build_service(config: &AppConfig) -> Result<ChartService, Report<AppError>> {
    let settings = ChartSettings::from_config(config).change_context(AppError::Config)?;

    let yahoo = Arc::new(YahooProvider::new(&config.provider).change_context(
        AppError::Setup {
            component: "price provider".into(),
        },
    )?);
    let names = build_resolvers(config, Arc::clone(&yahoo))?;
    if names.is_empty() {
        warn!("no name resolvers configured; charts will be titled with raw symbols");
    }

    let host: Arc<dyn ImageHost> = match config.host.kind.as_str() {
        "imgur" => {
            let client_id = config.host.client_id.clone().unwrap_or_default();
            Arc::new(
                ImgurHost::new(
                    &config.host.endpoint,
                    client_id,
                    Duration::from_secs(config.host.timeout_secs),
                )
                .change_context(AppError::Setup {
                    component: "image host".into(),
                })?,
            )
        }
        _ => Arc::new(LocalHost),
    };
    info!(host = host.name(), output_dir = %config.general.output_dir, "image host ready");

    Ok(ChartService::new(
        names,
        yahoo,
        Arc::new(PngChartRenderer::new(&config.chart)),
        host,
        settings,
    ))
}

fn build_resolvers(
    config: &AppConfig,
    yahoo: Arc<YahooProvider>,
) -> Result<ResolverChain, Report<AppError>> {
    let mut strategies = vec![yahoo as Arc<dyn SymbolNameResolver>];
    let fallback = &config.names.fallback_url;
    if !fallback.is_empty() {
        let web = WebPageResolver::new(
            fallback.as_str(),
            Duration::from_secs(config.provider.timeout_secs),
        )
        .change_context(AppError::Setup {
            component: "name resolver".into(),
        })?;
        strategies.push(Arc::new(web));
    }
    Ok(ResolverChain::new(strategies))
}
