/// Calculate Exponential Moving Average (EMA) for every sample
///
/// Seeded with the first value (no SMA warm-up), so the series is defined
/// from index 0. Smoothing factor is `2 / (period + 1)`.
pub fn calculate_ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    if period == 0 {
        return vec![f64::NAN; prices.len()];
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let mut series = Vec::with_capacity(prices.len());
    let mut ema = prices[0];
    series.push(ema);
    for price in &prices[1..] {
        ema = alpha * price + (1.0 - alpha) * ema;
        series.push(ema);
    }

    series
}
