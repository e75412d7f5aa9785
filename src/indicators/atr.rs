//! Average True Range (ATR) indicator
//!
//! Measures market volatility by averaging true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! The first bar has no previous close, so its true range is High - Low.
//! ATR here is a simple moving average of true range (not Wilder's
//! smoothing), undefined (NaN) until `period` true ranges exist.

/// True range for every bar, aligned with the input
pub fn calculate_true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let mut true_ranges = Vec::with_capacity(len);

    for i in 0..len {
        let range = high[i] - low[i];
        let tr = if i == 0 {
            range
        } else {
            let prev_close = close[i - 1];
            range
                .max((high[i] - prev_close).abs())
                .max((low[i] - prev_close).abs())
        };
        true_ranges.push(tr);
    }

    true_ranges
}

/// ATR series aligned with the input; first defined value at index `period - 1`
pub fn calculate_atr_series(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let true_ranges = calculate_true_range(high, low, close);
    let mut atr = vec![f64::NAN; true_ranges.len()];

    if period == 0 || true_ranges.len() < period {
        return atr;
    }

    let mut window_sum: f64 = true_ranges[..period].iter().sum();
    atr[period - 1] = window_sum / period as f64;

    for i in period..true_ranges.len() {
        window_sum += true_ranges[i] - true_ranges[i - period];
        atr[i] = window_sum / period as f64;
    }

    atr
}
