use std::fmt;

use chrono::NaiveDate;
use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One trading day of a security.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily bars of one symbol, strictly increasing by date.
///
/// May be empty; the indicators reject an empty series themselves.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting bars that are not strictly increasing by date.
    pub fn new(
        symbol: impl Into<String>,
        bars: Vec<PriceBar>,
    ) -> Result<Self, Report<ProviderError>> {
        let symbol = symbol.into();
        if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(Report::new(ProviderError::ResponseParse {
                provider: "price series".into(),
            })
            .attach(format!(
                "{symbol}: bar dated {} is not after {}",
                pair[1].date, pair[0].date
            )));
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[cfg(test)]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Indicator charted by a request.
///
/// String representations match the CLI (e.g. `"macd"`, `"bollinger"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Macd,
    Rsi,
    Bollinger,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 3] = [Self::Macd, Self::Rsi, Self::Bollinger];

    /// Parse a CLI string into an `IndicatorKind`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "macd" => Some(Self::Macd),
            "rsi" => Some(Self::Rsi),
            "bollinger" | "bbands" | "bb" => Some(Self::Bollinger),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Macd => "macd",
            Self::Rsi => "rsi",
            Self::Bollinger => "bollinger",
        }
    }

    /// Text appended to the security name in the chart title.
    pub fn title_suffix(self) -> &'static str {
        match self {
            Self::Macd => "MACD",
            Self::Rsi => "RSI",
            Self::Bollinger => "Bollinger Bands",
        }
    }

    pub fn y_label(self) -> &'static str {
        match self {
            Self::Macd => "Value",
            Self::Rsi => "RSI",
            Self::Bollinger => "Price",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named line of an indicator, one value per date (`NaN` = undefined).
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: &'static str,
    pub values: Vec<f64>,
}

/// Indicator output sharing the date axis of its input series.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub kind: IndicatorKind,
    pub dates: Vec<NaiveDate>,
    pub components: Vec<Component>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    #[cfg(test)]
    pub fn component(&self, name: &str) -> Option<&[f64]> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Number of dates where at least one component is defined.
    pub fn defined_len(&self) -> usize {
        (0..self.len())
            .filter(|&i| self.components.iter().any(|c| !c.values[i].is_nan()))
            .count()
    }
}
