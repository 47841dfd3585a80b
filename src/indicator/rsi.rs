use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::ma::rolling_mean;
use crate::indicator::{Indicator, close_prices, ensure_period};
use crate::model::{Component, IndicatorKind, IndicatorSeries, PriceSeries};

/// RSI using simple moving averages of gains and losses.
///
/// `rsi[t]` is `NaN` for `t < period`. A window with no losses gives 100;
/// a window with neither gains nor losses stays `NaN`.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period("period", period)?;
        Ok(Self { period })
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Indicator for Rsi {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn compute(&self, series: &PriceSeries) -> Result<IndicatorSeries, Report<IndicatorError>> {
        let prices = close_prices(series)?;

        // delta[0] has no predecessor
        let deltas: Vec<f64> = std::iter::once(f64::NAN)
            .chain(prices.windows(2).map(|w| w[1] - w[0]))
            .collect();
        let gains: Vec<f64> = deltas.iter().map(|&d| positive_part(d)).collect();
        let losses: Vec<f64> = deltas.iter().map(|&d| positive_part(-d)).collect();

        let avg_gain = rolling_mean(&gains, self.period);
        let avg_loss = rolling_mean(&losses, self.period);

        let rsi = avg_gain
            .iter()
            .zip(&avg_loss)
            .map(|(&g, &l)| rsi_value(g, l))
            .collect();

        Ok(IndicatorSeries {
            kind: IndicatorKind::Rsi,
            dates: series.dates(),
            components: vec![Component { name: "rsi", values: rsi }],
        })
    }
}

/// `max(x, 0)` that keeps `NaN` undefined.
fn positive_part(x: f64) -> f64 {
    if x.is_nan() { f64::NAN } else { x.max(0.0) }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain.is_nan() || avg_loss.is_nan() {
        return f64::NAN;
    }
    if avg_loss == 0.0 {
        // x/0 -> 100, 0/0 -> undefined
        return if avg_gain > 0.0 { 100.0 } else { f64::NAN };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
