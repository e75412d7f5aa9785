use serde::{Deserialize, Serialize};

use crate::execution::Quantizer;
use crate::models::Side;
use crate::strategy::initial_stop;

/// Risk budget and margin limits used to size entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub risk_pct: f64,
    pub min_risk_usd: f64,
    pub leverage: u32,
    pub margin_safety: f64,
    pub min_notional_buffer: f64,
    pub atr_mult_sl: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_pct: 0.02,            // 2% of equity per entry
            min_risk_usd: 0.5,         // Floor so tiny accounts still size
            leverage: 30,
            margin_safety: 0.95,       // Leave 5% margin headroom
            min_notional_buffer: 1.05, // Clear the exchange floor after rounding
            atr_mult_sl: 1.5,
        }
    }
}

impl RiskConfig {
    /// Largest notional the account may carry
    pub fn margin_cap(&self, equity: f64) -> f64 {
        (equity * self.leverage as f64 * self.margin_safety).max(0.0)
    }
}

/// Converts equity and stop distance into an exchange-valid quantity
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: RiskConfig,
}

impl PositionSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Quantity to open, or 0.0 when no viable size exists
    ///
    /// Risk-based size is capped by leverage-implied margin, snapped to the
    /// symbol's step, and bumped to clear the minimum notional. A bump that
    /// would break the margin cap yields 0.0.
    pub fn compute_quantity(
        &self,
        equity: f64,
        atr: f64,
        entry_price: f64,
        side: Side,
        symbol: &str,
        quantizer: &Quantizer,
    ) -> f64 {
        if !(entry_price > 0.0) || !atr.is_finite() {
            return 0.0;
        }

        let risk_amount = self.config.min_risk_usd.max(equity * self.config.risk_pct);
        let stop_price = initial_stop(entry_price, atr, side, self.config.atr_mult_sl);
        let stop_distance = (entry_price - stop_price).abs();
        if !(stop_distance > 0.0) {
            return 0.0;
        }

        let qty_by_risk = risk_amount / stop_distance;
        let margin_cap = self.config.margin_cap(equity);
        let qty_by_margin = margin_cap / entry_price;

        let mut qty = quantizer.round_qty(symbol, qty_by_risk.min(qty_by_margin));

        let min_notional = quantizer.min_notional(symbol);
        if min_notional > 0.0 && qty * entry_price < min_notional {
            let bumped = min_notional / entry_price * self.config.min_notional_buffer;
            qty = quantizer.round_qty(symbol, bumped);
        }

        let tolerance = quantizer.filter_or_default(symbol).step_size * entry_price;
        if qty * entry_price > margin_cap + tolerance {
            tracing::debug!(
                "{} size {} (notional ${:.2}) exceeds margin cap ${:.2}, skipping",
                symbol,
                qty,
                qty * entry_price,
                margin_cap
            );
            return 0.0;
        }

        tracing::debug!(
            "{} sized {}: risk ${:.2}, stop distance {:.6}, by risk {:.6}, by margin {:.6}",
            symbol,
            qty,
            risk_amount,
            stop_distance,
            qty_by_risk,
            qty_by_margin
        );

        qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SymbolFilter;
    use std::collections::HashMap;

    fn quantizer(step: f64, min_qty: f64, min_notional: f64) -> Quantizer {
        let mut filters = HashMap::new();
        filters.insert(
            "TESTUSDT".to_string(),
            SymbolFilter {
                tick_size: 0.01,
                step_size: step,
                min_qty,
                min_notional,
            },
        );
        Quantizer::new(filters)
    }

    #[test]
    fn test_risk_bound_wins() {
        // equity 20, 2% risk = 0.4, stop 1.5 ATR = 15 -> 0.0267; margin allows 0.57
        let sizer = PositionSizer::new(RiskConfig {
            min_risk_usd: 0.1,
            ..Default::default()
        });
        let q = quantizer(0.001, 0.001, 0.0);

        let qty = sizer.compute_quantity(20.0, 10.0, 1000.0, Side::Long, "TESTUSDT", &q);
        assert_eq!(qty, 0.027);
    }

    #[test]
    fn test_risk_floor_applies() {
        // 2% of 20 is below the 0.5 floor: 0.5 / 15 = 0.0333
        let sizer = PositionSizer::default();
        let q = quantizer(0.001, 0.001, 0.0);

        let qty = sizer.compute_quantity(20.0, 10.0, 1000.0, Side::Short, "TESTUSDT", &q);
        assert_eq!(qty, 0.033);
    }

    #[test]
    fn test_margin_bound_wins() {
        // Tiny ATR makes risk size huge; margin cap 20 * 30 * 0.95 = 570 -> 0.57
        let sizer = PositionSizer::default();
        let q = quantizer(0.001, 0.001, 0.0);

        let qty = sizer.compute_quantity(20.0, 0.001, 1000.0, Side::Long, "TESTUSDT", &q);
        assert_eq!(qty, 0.57);
    }

    #[test]
    fn test_min_notional_bump() {
        // Risk size 0.033 * 1000 = 33 < 100 min notional -> 100 / 1000 * 1.05 = 0.105
        let sizer = PositionSizer::default();
        let q = quantizer(0.001, 0.001, 100.0);

        let qty = sizer.compute_quantity(20.0, 10.0, 1000.0, Side::Long, "TESTUSDT", &q);
        assert_eq!(qty, 0.105);
    }

    #[test]
    fn test_min_notional_above_margin_cap_skips() {
        // Margin cap is 570 but the exchange floor is 1000
        let sizer = PositionSizer::default();
        let q = quantizer(0.001, 0.001, 1000.0);

        let qty = sizer.compute_quantity(20.0, 10.0, 1000.0, Side::Long, "TESTUSDT", &q);
        assert_eq!(qty, 0.0);
    }

    #[test]
    fn test_unusable_atr_returns_zero() {
        let sizer = PositionSizer::default();
        let q = quantizer(0.001, 0.001, 0.0);

        assert_eq!(sizer.compute_quantity(20.0, 0.0, 1000.0, Side::Long, "TESTUSDT", &q), 0.0);
        assert_eq!(sizer.compute_quantity(20.0, f64::NAN, 1000.0, Side::Long, "TESTUSDT", &q), 0.0);
        assert_eq!(sizer.compute_quantity(20.0, 10.0, 0.0, Side::Long, "TESTUSDT", &q), 0.0);
    }

    #[test]
    fn test_margin_cap() {
        let config = RiskConfig::default();
        assert!((config.margin_cap(20.0) - 570.0).abs() < 1e-9);
        assert_eq!(config.margin_cap(-5.0), 0.0);
    }
}
