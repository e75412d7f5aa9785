// Trading strategy module
pub mod breakout;
pub mod signals;

pub use breakout::{BreakoutStrategy, SignalInfo};
pub use signals::{
    improves_trail, initial_stop, should_pyramid, stop_crossed, trail_stop, SignalConfig,
};

use crate::indicators::IndicatorFrame;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the two most recent bars of a frame
    fn evaluate(&self, frame: &IndicatorFrame) -> SignalInfo;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
