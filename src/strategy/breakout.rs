use super::{signals::SignalConfig, Strategy};
use crate::indicators::IndicatorFrame;
use crate::models::{Candle, Signal};

/// Diagnostics attached to every evaluation, signal or not
#[derive(Debug, Clone, PartialEq)]
pub struct SignalInfo {
    pub signal: Signal,
    pub entry_price: f64,
    pub atr: f64,
    pub donchian_upper: f64,
    pub donchian_lower: f64,
    pub ema_slow: f64,
    pub reason: Option<String>,
}

impl SignalInfo {
    fn none() -> Self {
        Self {
            signal: Signal::None,
            entry_price: f64::NAN,
            atr: f64::NAN,
            donchian_upper: f64::NAN,
            donchian_lower: f64::NAN,
            ema_slow: f64::NAN,
            reason: None,
        }
    }

    /// ATR is usable for sizing and stops
    pub fn has_valid_atr(&self) -> bool {
        self.atr.is_finite() && self.atr > 0.0
    }
}

/// Donchian breakout filtered by the slow EMA trend
///
/// - LONG when the close breaks above the channel while above the slow EMA
/// - SHORT when the close breaks below the channel while below the slow EMA
///
/// The prior bar must still be inside the channel, so only the breakout bar
/// itself fires.
#[derive(Debug, Clone, Default)]
pub struct BreakoutStrategy {
    config: SignalConfig,
}

impl BreakoutStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn build_frame(&self, candles: &[Candle]) -> IndicatorFrame {
        IndicatorFrame::build(candles, &self.config.periods())
    }
}

impl Strategy for BreakoutStrategy {
    fn evaluate(&self, frame: &IndicatorFrame) -> SignalInfo {
        let Some((prior, last)) = frame.last_two() else {
            return SignalInfo::none();
        };

        let mut info = SignalInfo {
            signal: Signal::None,
            entry_price: last.close,
            atr: last.atr,
            donchian_upper: last.donchian_upper,
            donchian_lower: last.donchian_lower,
            ema_slow: last.ema_slow,
            reason: None,
        };

        if !prior.is_warmed_up() || !last.is_warmed_up() {
            return info;
        }

        let break_up = last.close > last.ema_slow
            && prior.close <= prior.donchian_upper
            && last.close > last.donchian_upper;
        let break_down = last.close < last.ema_slow
            && prior.close >= prior.donchian_lower
            && last.close < last.donchian_lower;

        if break_up {
            info.signal = Signal::Long;
            info.reason = Some(format!("BreakUp+EMA{}Up", self.config.ema_slow_period));
        } else if break_down {
            info.signal = Signal::Short;
            info.reason = Some(format!("BreakDown+EMA{}Down", self.config.ema_slow_period));
        }

        info
    }

    fn name(&self) -> &str {
        "BreakoutStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.samples_needed()
    }
}
