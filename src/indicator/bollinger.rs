use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::{rolling_mean, rolling_sample_std};
use crate::indicator::{Indicator, close_prices, ensure_period};
use crate::model::{Component, IndicatorKind, IndicatorSeries, PriceSeries};

pub struct BollingerBands {
    window: usize,
    num_std_dev: f64,
}

impl BollingerBands {
    pub fn new(window: usize, num_std_dev: f64) -> Result<Self, Report<IndicatorError>> {
        ensure_period("window", window)?;
        if !num_std_dev.is_finite() || num_std_dev < 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "num_std_dev must be finite and >= 0".into(),
            });
        }
        Ok(Self {
            window,
            num_std_dev,
        })
    }
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self {
            window: 20,
            num_std_dev: 2.0,
        }
    }
}

impl Indicator for BollingerBands {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Bollinger
    }

    /// Returns upper, middle and lower bands; `NaN` for `t < window - 1`.
    fn compute(&self, series: &PriceSeries) -> Result<IndicatorSeries, Report<IndicatorError>> {
        let prices = close_prices(series)?;

        let middle = rolling_mean(&prices, self.window);
        let std = rolling_sample_std(&prices, self.window);

        let (upper, lower): (Vec<f64>, Vec<f64>) = middle
            .iter()
            .zip(&std)
            .map(|(&m, &s)| {
                let width = self.num_std_dev * s;
                (m + width, m - width)
            })
            .unzip();

        Ok(IndicatorSeries {
            kind: IndicatorKind::Bollinger,
            dates: series.dates(),
            components: vec![
                Component {
                    name: "upper",
                    values: upper,
                },
                Component {
                    name: "middle",
                    values: middle,
                },
                Component {
                    name: "lower",
                    values: lower,
                },
            ],
        })
    }
}
