use super::{calculate_atr_series, calculate_donchian, calculate_ema_series};
use crate::models::Candle;

/// Indicator periods used to build a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePeriods {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub donchian: usize,
    pub atr: usize,
}

impl FramePeriods {
    /// Bars to request so every indicator is warmed up on the last two bars
    pub fn lookback(&self) -> usize {
        self.ema_slow.max(self.donchian).max(self.atr) + 5
    }
}

impl Default for FramePeriods {
    fn default() -> Self {
        Self {
            ema_fast: 50,
            ema_slow: 200,
            donchian: 20,
            atr: 14,
        }
    }
}

/// One bar plus its indicator values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRow {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub donchian_upper: f64,
    pub donchian_lower: f64,
    pub atr: f64,
}

impl FrameRow {
    /// True when every indicator column is defined
    pub fn is_warmed_up(&self) -> bool {
        [
            self.ema_fast,
            self.ema_slow,
            self.donchian_upper,
            self.donchian_lower,
            self.atr,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Bar series augmented with indicator columns. Recomputed every cycle,
/// never persisted.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    pub close: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
    pub donchian_upper: Vec<f64>,
    pub donchian_lower: Vec<f64>,
    pub atr: Vec<f64>,
}

impl IndicatorFrame {
    pub fn build(candles: &[Candle], periods: &FramePeriods) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let channel = calculate_donchian(&high, &low, periods.donchian);

        Self {
            ema_fast: calculate_ema_series(&close, periods.ema_fast),
            ema_slow: calculate_ema_series(&close, periods.ema_slow),
            donchian_upper: channel.upper,
            donchian_lower: channel.lower,
            atr: calculate_atr_series(&high, &low, &close, periods.atr),
            close,
            high,
            low,
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<FrameRow> {
        if index >= self.len() {
            return None;
        }
        Some(FrameRow {
            close: self.close[index],
            high: self.high[index],
            low: self.low[index],
            ema_fast: self.ema_fast[index],
            ema_slow: self.ema_slow[index],
            donchian_upper: self.donchian_upper[index],
            donchian_lower: self.donchian_lower[index],
            atr: self.atr[index],
        })
    }

    pub fn last(&self) -> Option<FrameRow> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    /// The (prior, last) pair of rows
    pub fn last_two(&self) -> Option<(FrameRow, FrameRow)> {
        let len = self.len();
        if len < 2 {
            return None;
        }
        Some((self.row(len - 2)?, self.row(len - 1)?))
    }

    /// Highest high over the trailing `window` bars (fewer if not available)
    pub fn highest_high(&self, window: usize) -> Option<f64> {
        let start = self.len().saturating_sub(window.max(1));
        let slice = &self.high[start..];
        (!slice.is_empty()).then(|| super::rolling_max(slice))
    }

    /// Lowest low over the trailing `window` bars (fewer if not available)
    pub fn lowest_low(&self, window: usize) -> Option<f64> {
        let start = self.len().saturating_sub(window.max(1));
        let slice = &self.low[start..];
        (!slice.is_empty()).then(|| super::rolling_min(slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_lookback_uses_longest_period() {
        let periods = FramePeriods::default();
        assert_eq!(periods.lookback(), 205);
    }

    #[test]
    fn test_frame_columns_aligned() {
        let periods = FramePeriods {
            ema_fast: 3,
            ema_slow: 5,
            donchian: 4,
            atr: 3,
        };
        let frame = IndicatorFrame::build(&candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), &periods);

        assert_eq!(frame.len(), 6);
        assert_eq!(frame.atr.len(), 6);
        assert!(!frame.row(2).unwrap().is_warmed_up());
        assert!(frame.last().unwrap().is_warmed_up());
        assert_eq!(frame.last().unwrap().donchian_upper, 7.0);
    }

    #[test]
    fn test_last_two_requires_two_bars() {
        let frame = IndicatorFrame::build(&candles(&[1.0]), &FramePeriods::default());
        assert!(frame.last_two().is_none());
    }

    #[test]
    fn test_rolling_extremes_clamp_to_available_bars() {
        let frame = IndicatorFrame::build(&candles(&[10.0, 20.0, 15.0]), &FramePeriods::default());

        assert_eq!(frame.highest_high(100), Some(21.0));
        assert_eq!(frame.lowest_low(100), Some(9.0));
        assert_eq!(frame.highest_high(1), Some(16.0));
    }
}
