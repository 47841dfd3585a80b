//! Series helpers shared by the indicators.
//!
//! Every helper returns a vector aligned with its input: index `t` of the
//! output describes index `t` of the input, and positions without a complete
//! lookback window hold `NaN`.

/// Exponential moving average with smoothing factor `2 / (span + 1)`.
///
/// Seeded with the first observation and no warm-up bias adjustment, so the
/// output is defined from index 0: `ema[t] = α·x[t] + (1-α)·ema[t-1]`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &x in values {
        let next = match prev {
            None => x,
            Some(p) => alpha * x + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Arithmetic mean of the trailing `window` values.
///
/// `NaN` until `window` values are available; a window containing `NaN`
/// yields `NaN`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, mean)
}

/// Sample standard deviation (n - 1 denominator) of the trailing `window`
/// values. A window of one value has no sample deviation and yields `NaN`.
pub fn rolling_sample_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        if w.len() < 2 {
            return f64::NAN;
        }
        let m = mean(w);
        let sum_sq = w.iter().map(|&x| (x - m).powi(2)).sum::<f64>();
        (sum_sq / (w.len() - 1) as f64).sqrt()
    })
}

fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    if window == 0 {
        return vec![f64::NAN; values.len()];
    }
    let lead = (window - 1).min(values.len());
    let mut out = vec![f64::NAN; lead];
    out.extend(values.windows(window).map(f));
    out
}

fn mean(w: &[f64]) -> f64 {
    w.iter().sum::<f64>() / w.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seeds_with_first_value() {
        let values = ema(&[10.0, 20.0, 30.0], 3);
        // alpha = 0.5
        assert_eq!(values[0], 10.0);
        assert!((values[1] - 15.0).abs() < 1e-9);
        assert!((values[2] - 22.5).abs() < 1e-9);
    }

    #[test]
    fn ema_flat_prices() {
        for v in ema(&[10.0; 6], 4) {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_empty_input() {
        assert!(ema(&[], 12).is_empty());
    }

    #[test]
    fn rolling_mean_known_value() {
        let values = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(values.len(), 4);
        assert!(values[0].is_nan() && values[1].is_nan());
        // (1+2+3)/3 = 2.0, (2+3+4)/3 = 3.0
        assert!((values[2] - 2.0).abs() < 1e-9);
        assert!((values[3] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_mean_shorter_than_window() {
        let values = rolling_mean(&[1.0, 2.0], 5);
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rolling_mean_propagates_nan() {
        let values = rolling_mean(&[f64::NAN, 2.0, 4.0, 6.0], 2);
        assert!(values[1].is_nan());
        assert!((values[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_std_uses_sample_denominator() {
        // mean 2, squared deviations 1 + 0 + 1 = 2, / (3 - 1) = 1
        let values = rolling_sample_std(&[1.0, 2.0, 3.0], 3);
        assert!((values[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_std_single_value_window_is_undefined() {
        let values = rolling_sample_std(&[1.0, 2.0], 1);
        assert!(values.iter().all(|v| v.is_nan()));
    }
}
