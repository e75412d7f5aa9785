use std::collections::HashMap;
use thiserror::Error;

use crate::models::SymbolFilter;

/// Maximum decimal places used when snapping to a tick or step
const MAX_PRECISION: u32 = 8;

#[derive(Debug, Error, PartialEq)]
pub enum QuantizeError {
    #[error("no symbol filter loaded for {0}")]
    MissingFilter(String),
}

/// Rounds prices and quantities to exchange granularity
///
/// Holds an immutable map of filters, built once from the exchange's
/// symbol info. Replace the whole quantizer to refresh.
#[derive(Debug, Clone, Default)]
pub struct Quantizer {
    filters: HashMap<String, SymbolFilter>,
}

impl Quantizer {
    pub fn new(filters: HashMap<String, SymbolFilter>) -> Self {
        Self { filters }
    }

    pub fn filter(&self, symbol: &str) -> Option<&SymbolFilter> {
        self.filters.get(symbol)
    }

    /// Filter for a symbol, required before sending live orders
    pub fn require(&self, symbol: &str) -> Result<&SymbolFilter, QuantizeError> {
        self.filter(symbol)
            .ok_or_else(|| QuantizeError::MissingFilter(symbol.to_string()))
    }

    /// Filter for a symbol, or the documented fallback (tick 0.01, step 0.001)
    pub fn filter_or_default(&self, symbol: &str) -> SymbolFilter {
        self.filter(symbol).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn round_price(&self, symbol: &str, price: f64) -> f64 {
        round_to_tick(price, self.filter_or_default(symbol).tick_size)
    }

    pub fn round_qty(&self, symbol: &str, qty: f64) -> f64 {
        let filter = self.filter_or_default(symbol);
        round_to_step(qty, filter.step_size, filter.min_qty)
    }

    pub fn min_notional(&self, symbol: &str) -> f64 {
        self.filter(symbol).map(|f| f.min_notional).unwrap_or(0.0)
    }
}

/// Snap a price to the nearest multiple of `tick_size`
///
/// Non-positive tick sizes pass the price through unchanged.
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 || !tick_size.is_finite() {
        return price;
    }
    let snapped = (price / tick_size).round() * tick_size;
    round_dp(snapped, decimal_places(tick_size))
}

/// Snap a quantity to the nearest multiple of `step_size`, then lift it to
/// the first step multiple at or above `min_qty`. A quantity that rounds to
/// zero stays zero.
pub fn round_to_step(qty: f64, step_size: f64, min_qty: f64) -> f64 {
    let on_grid = step_size > 0.0 && step_size.is_finite();
    let snapped = if on_grid {
        round_dp((qty / step_size).round() * step_size, MAX_PRECISION)
    } else {
        qty
    };

    if snapped.is_nan() || snapped <= 0.0 {
        return 0.0;
    }
    if snapped >= min_qty {
        return snapped;
    }
    if on_grid {
        let steps = round_dp(min_qty / step_size, MAX_PRECISION).ceil();
        round_dp(steps * step_size, MAX_PRECISION)
    } else {
        min_qty
    }
}

/// Textual form for order payloads: fixed 8 decimals, trailing zeros trimmed
pub fn format_decimal(value: f64) -> String {
    let text = format!("{:.*}", MAX_PRECISION as usize, value);
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Fractional digits of an increment such as 0.001 (capped)
fn decimal_places(increment: f64) -> u32 {
    (0..MAX_PRECISION)
        .find(|&places| {
            let scaled = increment * 10f64.powi(places as i32);
            (scaled - scaled.round()).abs() < 1e-9
        })
        .unwrap_or(MAX_PRECISION)
}

fn round_dp(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
