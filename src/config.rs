use std::path::Path;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_output_dir() -> String {
    "./charts".into()
}

fn default_start_date() -> String {
    "2019-01-01".into()
}

fn default_provider_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_symbol_suffix() -> String {
    ".TW".into()
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_fallback_url() -> String {
    "https://tw.stock.yahoo.com/q/q?s={symbol}".into()
}

fn default_font_family() -> String {
    "sans-serif".into()
}

fn default_width() -> u32 {
    1600
}

fn default_height() -> u32 {
    800
}

fn default_x_label() -> String {
    "Date".into()
}

fn default_host_kind() -> String {
    "imgur".into()
}

fn default_host_endpoint() -> String {
    "https://api.imgur.com/3/image".into()
}

fn default_host_timeout_secs() -> u64 {
    30
}

fn default_backoff() -> String {
    "exponential".into()
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub names: NamesConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub indicators: IndicatorsConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// `YYYY-MM-DD`
    #[serde(default = "default_start_date")]
    pub start_date: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            output_dir: default_output_dir(),
            start_date: default_start_date(),
        }
    }
}

impl GeneralConfig {
    pub fn start_date(&self) -> Result<NaiveDate, Report<ConfigError>> {
        NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d").change_context(
            ConfigError::Validation {
                field: format!("general.start_date \"{}\" is not YYYY-MM-DD", self.start_date),
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Appended to user symbols to form the listing symbol (e.g. `2330` -> `2330.TW`).
    #[serde(default = "default_symbol_suffix")]
    pub symbol_suffix: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            symbol_suffix: default_symbol_suffix(),
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NamesConfig {
    /// Quote page used when the provider has no name. `{symbol}` is replaced
    /// with the raw symbol; an empty string disables the fallback.
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            fallback_url: default_fallback_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartConfig {
    /// Font file used for chart text. A missing file falls back to `font_family`.
    #[serde(default)]
    pub font_path: Option<String>,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_x_label")]
    pub x_label: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_family: default_font_family(),
            width: default_width(),
            height: default_height(),
            x_label: default_x_label(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    /// Accepted values: `"imgur"` | `"local"`
    #[serde(default = "default_host_kind")]
    pub kind: String,
    #[serde(default = "default_host_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_host_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            kind: default_host_kind(),
            endpoint: default_host_endpoint(),
            client_id: None,
            timeout_secs: default_host_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Accepted values: `"fixed"` | `"exponential"`
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: default_backoff(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicatorsConfig {
    #[serde(default)]
    pub macd: MacdParams,
    #[serde(default)]
    pub rsi: RsiParams,
    #[serde(default)]
    pub bollinger: BollingerParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self { period: 14 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BollingerParams {
    pub window: usize,
    pub num_std_dev: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            window: 20,
            num_std_dev: 2.0,
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_HOST_KINDS: &[&str] = &["imgur", "local"];
const VALID_BACKOFFS: &[&str] = &["fixed", "exponential"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_provider(config)?;
    validate_names(config)?;
    validate_chart(config)?;
    validate_host(config)?;
    validate_retry(config)?;
    validate_indicators(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            config.general.log_format
        )));
    }
    config.general.start_date()?;
    Ok(())
}

fn validate_provider(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.provider.requests_per_second == 0 {
        return Err(invalid("provider.requests_per_second must be > 0".into()));
    }
    if config.provider.timeout_secs == 0 {
        return Err(invalid("provider.timeout_secs must be > 0".into()));
    }
    Ok(())
}

fn validate_names(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let url = &config.names.fallback_url;
    if !url.is_empty() && !url.contains("{symbol}") {
        return Err(invalid(format!(
            "names.fallback_url \"{url}\" has no {{symbol}} placeholder"
        )));
    }
    Ok(())
}

fn validate_chart(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.chart.width == 0 || config.chart.height == 0 {
        return Err(invalid("chart.width and chart.height must be > 0".into()));
    }
    Ok(())
}

fn validate_host(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let host = &config.host;
    if !VALID_HOST_KINDS.contains(&host.kind.as_str()) {
        return Err(invalid(format!("host.kind \"{}\" is not valid", host.kind)));
    }
    if host.kind == "imgur" && host.client_id.as_deref().is_none_or(str::is_empty) {
        return Err(invalid("host.client_id is required for kind \"imgur\"".into()));
    }
    Ok(())
}

fn validate_retry(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_BACKOFFS.contains(&config.retry.backoff.as_str()) {
        return Err(invalid(format!(
            "retry.backoff \"{}\" is not valid",
            config.retry.backoff
        )));
    }
    Ok(())
}

fn validate_indicators(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let params = &config.indicators;
    Macd::new(params.macd.fast, params.macd.slow, params.macd.signal)
        .change_context(ConfigError::Validation {
            field: "indicators.macd".into(),
        })?;
    Rsi::new(params.rsi.period).change_context(ConfigError::Validation {
        field: "indicators.rsi".into(),
    })?;
    BollingerBands::new(params.bollinger.window, params.bollinger.num_std_dev).change_context(
        ConfigError::Validation {
            field: "indicators.bollinger".into(),
        },
    )?;
    Ok(())
}
