use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::ma::ema;
use crate::indicator::{Indicator, close_prices, ensure_period};
use crate::model::{Component, IndicatorKind, IndicatorSeries, PriceSeries};

/// MACD with signal line and histogram.
///
/// All EMAs are seeded with the first observation, so every date of the
/// input carries a value. Early values are less reliable than later ones.
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        ensure_period("fast_period", fast_period)?;
        ensure_period("slow_period", slow_period)?;
        ensure_period("signal_period", signal_period)?;
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

impl Indicator for Macd {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Macd
    }

    fn compute(&self, series: &PriceSeries) -> Result<IndicatorSeries, Report<IndicatorError>> {
        let prices = close_prices(series)?;

        let fast_ema = ema(&prices, self.fast_period);
        let slow_ema = ema(&prices, self.slow_period);
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(&slow_ema)
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = ema(&macd_line, self.signal_period);
        let histogram: Vec<f64> = macd_line
            .iter()
            .zip(&signal_line)
            .map(|(m, s)| m - s)
            .collect();

        Ok(IndicatorSeries {
            kind: IndicatorKind::Macd,
            dates: series.dates(),
            components: vec![
                Component {
                    name: "macd",
                    values: macd_line,
                },
                Component {
                    name: "signal",
                    values: signal_line,
                },
                Component {
                    name: "histogram",
                    values: histogram,
                },
            ],
        })
    }
}
