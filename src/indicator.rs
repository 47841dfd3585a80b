pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;

use error_stack::{Report, bail};

use crate::config::IndicatorsConfig;
use crate::error::IndicatorError;
use crate::model::{IndicatorKind, IndicatorSeries, PriceSeries};

use bollinger::BollingerBands;
use macd::Macd;
use rsi::Rsi;

/// A technical analysis indicator computed over a whole daily price series.
///
/// Implementations are pure: the output shares the input's date axis and
/// positions inside an incomplete lookback window hold `NaN`.
pub trait Indicator: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    fn compute(&self, series: &PriceSeries) -> Result<IndicatorSeries, Report<IndicatorError>>;
}

/// Extract close prices, failing on an empty series.
pub fn close_prices(series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>> {
    if series.is_empty() {
        bail!(IndicatorError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    Ok(series.closes())
}

pub(crate) fn ensure_period(name: &str, period: usize) -> Result<(), Report<IndicatorError>> {
    if period == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: format!("{name} must be > 0"),
        });
    }
    Ok(())
}

/// Build the indicator for `kind` with the configured parameters.
pub fn build_indicator(
    kind: IndicatorKind,
    params: &IndicatorsConfig,
) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    Ok(match kind {
        IndicatorKind::Macd => Box::new(Macd::new(
            params.macd.fast,
            params.macd.slow,
            params.macd.signal,
        )?),
        IndicatorKind::Rsi => Box::new(Rsi::new(params.rsi.period)?),
        IndicatorKind::Bollinger => Box::new(BollingerBands::new(
            params.bollinger.window,
            params.bollinger.num_std_dev,
        )?),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::series_from_closes;
    use super::*;
    use crate::config::IndicatorsConfig;

    #[test]
    fn close_prices_rejects_empty_series() {
        let err = close_prices(&series_from_closes(&[])).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InsufficientData { available: 0, .. }
        ));
    }

    #[test]
    fn build_indicator_uses_default_parameters() {
        let params = IndicatorsConfig::default();
        for kind in IndicatorKind::ALL {
            let indicator = build_indicator(kind, &params).unwrap();
            assert_eq!(indicator.kind(), kind);
        }
    }

    #[test]
    fn built_indicators_fail_on_empty_series() {
        let params = IndicatorsConfig::default();
        let empty = series_from_closes(&[]);
        for kind in IndicatorKind::ALL {
            let indicator = build_indicator(kind, &params).unwrap();
            let err = indicator.compute(&empty).unwrap_err();
            assert!(matches!(
                err.current_context(),
                IndicatorError::InsufficientData { .. }
            ));
        }
    }

    #[test]
    fn build_indicator_rejects_zero_period() {
        let mut params = IndicatorsConfig::default();
        params.rsi.period = 0;
        assert!(build_indicator(IndicatorKind::Rsi, &params).is_err());
    }
}
