// Technical indicators module
// Implements EMA, ATR and Donchian channel with NaN-until-warmed-up series

pub mod atr;
pub mod donchian;
pub mod frame;
pub mod moving_average;

pub use atr::{calculate_atr_series, calculate_true_range};
pub use donchian::{calculate_donchian, rolling_max, rolling_min, DonchianChannel};
pub use frame::{FramePeriods, FrameRow, IndicatorFrame};
pub use moving_average::calculate_ema_series;
