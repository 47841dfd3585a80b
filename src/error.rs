use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("no price data for {symbol}")]
    NoData { symbol: String },
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
}

#[derive(Debug, Display, Error)]
#[display("failed to resolve display name for {symbol} via {strategy}")]
pub struct NameResolutionError {
    pub symbol: String,
    pub strategy: String,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum RenderError {
    #[display("failed to prepare output directory")]
    OutputDir,
    #[display("failed to rasterize chart")]
    Rasterize,
    #[display("failed to write chart image")]
    Write,
}

#[derive(Debug, Display, Error)]
pub enum UploadError {
    #[display("failed to read image artifact")]
    ReadArtifact,
    #[display("image host {host} is unreachable")]
    Unreachable { host: String },
    #[display("image host {host} rejected the upload")]
    Rejected { host: String },
    #[display("failed to parse response from {host}")]
    ResponseParse { host: String },
}

/// The single user-facing failure of one chart request.
#[derive(Debug, Display, Error)]
pub enum ChartError {
    #[display("could not fetch price data for {symbol}")]
    Fetch { symbol: String },
    #[display("could not compute {indicator} for {symbol}")]
    Compute { symbol: String, indicator: String },
    #[display("could not render {indicator} chart for {symbol}")]
    Render { symbol: String, indicator: String },
    #[display("could not upload {indicator} chart for {symbol}")]
    Upload { symbol: String, indicator: String },
}
