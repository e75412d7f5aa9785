use crate::indicators::FramePeriods;
use crate::models::Side;

/// Configuration for signal generation and stop placement
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub donchian_period: usize,
    pub atr_period: usize,
    pub atr_mult_sl: f64,    // Initial stop distance in ATRs
    pub atr_mult_trail: f64, // Trail offset from rolling extreme in ATRs
    pub trail_lookback: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            ema_fast_period: 50,
            ema_slow_period: 200,
            donchian_period: 20,
            atr_period: 14,
            atr_mult_sl: 1.5,
            atr_mult_trail: 2.0,
            trail_lookback: 100,
        }
    }
}

impl SignalConfig {
    pub fn periods(&self) -> FramePeriods {
        FramePeriods {
            ema_fast: self.ema_fast_period,
            ema_slow: self.ema_slow_period,
            donchian: self.donchian_period,
            atr: self.atr_period,
        }
    }

    /// Number of bars to fetch each cycle
    ///
    /// # Example
    /// ```
    /// use trendbot::strategy::signals::SignalConfig;
    ///
    /// let config = SignalConfig::default();
    /// // max(200, 20, 14) + 5
    /// assert_eq!(config.samples_needed(), 205);
    /// ```
    pub fn samples_needed(&self) -> usize {
        self.periods().lookback()
    }
}

/// Protective stop placed at entry: `atr_mult_sl` ATRs against the position
pub fn initial_stop(entry_price: f64, atr: f64, side: Side, atr_mult_sl: f64) -> f64 {
    match side {
        Side::Long => entry_price - atr_mult_sl * atr,
        Side::Short => entry_price + atr_mult_sl * atr,
    }
}

/// Candidate trail: `atr_mult_trail` ATRs behind the favorable rolling extreme
pub fn trail_stop(highest: f64, lowest: f64, atr: f64, side: Side, atr_mult_trail: f64) -> f64 {
    match side {
        Side::Long => highest - atr_mult_trail * atr,
        Side::Short => lowest + atr_mult_trail * atr,
    }
}

/// True if `candidate` tightens `current` for the given side
pub fn improves_trail(side: Side, candidate: f64, current: Option<f64>) -> bool {
    match current {
        None => candidate.is_finite(),
        Some(current) => match side {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        },
    }
}

/// True if price moved at least `step_atr` ATRs beyond the last add and
/// the add budget is not exhausted
pub fn should_pyramid(
    side: Side,
    last_price: f64,
    last_add_price: f64,
    atr: f64,
    step_atr: f64,
    max_adds: u32,
    adds_done: u32,
) -> bool {
    if adds_done >= max_adds {
        return false;
    }

    match side {
        Side::Long => last_price >= last_add_price + step_atr * atr,
        Side::Short => last_price <= last_add_price - step_atr * atr,
    }
}

/// True if the close crossed the trail against the position
pub fn stop_crossed(side: Side, last_price: f64, trail: f64) -> bool {
    match side {
        Side::Long => last_price <= trail,
        Side::Short => last_price >= trail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_stop() {
        assert_eq!(initial_stop(1000.0, 10.0, Side::Long, 1.5), 985.0);
        assert_eq!(initial_stop(1000.0, 10.0, Side::Short, 1.5), 1015.0);
    }

    #[test]
    fn test_trail_stop() {
        assert_eq!(trail_stop(1100.0, 900.0, 10.0, Side::Long, 2.0), 1080.0);
        assert_eq!(trail_stop(1100.0, 900.0, 10.0, Side::Short, 2.0), 920.0);
    }

    #[test]
    fn test_improves_trail() {
        assert!(improves_trail(Side::Long, 990.0, None));
        assert!(improves_trail(Side::Long, 991.0, Some(990.0)));
        assert!(!improves_trail(Side::Long, 990.0, Some(990.0)));
        assert!(!improves_trail(Side::Long, 980.0, Some(990.0)));

        assert!(improves_trail(Side::Short, 1009.0, Some(1010.0)));
        assert!(!improves_trail(Side::Short, 1011.0, Some(1010.0)));
        assert!(!improves_trail(Side::Short, f64::NAN, None));
    }

    #[test]
    fn test_should_pyramid() {
        assert!(should_pyramid(Side::Long, 1010.0, 1000.0, 10.0, 1.0, 4, 0));
        assert!(!should_pyramid(Side::Long, 1009.0, 1000.0, 10.0, 1.0, 4, 0));
        assert!(should_pyramid(Side::Short, 990.0, 1000.0, 10.0, 1.0, 4, 3));
        assert!(!should_pyramid(Side::Short, 990.0, 1000.0, 10.0, 1.0, 4, 4));
    }

    #[test]
    fn test_stop_crossed() {
        assert!(stop_crossed(Side::Long, 985.0, 990.0));
        assert!(stop_crossed(Side::Long, 990.0, 990.0));
        assert!(!stop_crossed(Side::Long, 995.0, 990.0));
        assert!(stop_crossed(Side::Short, 1010.0, 1010.0));
        assert!(!stop_crossed(Side::Short, 1005.0, 1010.0));
    }
}
