/// Donchian channel: rolling highest high / lowest low over `period` bars
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonchianChannel {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub mid: Vec<f64>,
}

/// Calculate the channel, aligned with the input
///
/// Entries before index `period - 1` are NaN.
pub fn calculate_donchian(high: &[f64], low: &[f64], period: usize) -> DonchianChannel {
    let len = high.len().min(low.len());
    let mut channel = DonchianChannel {
        upper: vec![f64::NAN; len],
        lower: vec![f64::NAN; len],
        mid: vec![f64::NAN; len],
    };

    if period == 0 || len < period {
        return channel;
    }

    for i in (period - 1)..len {
        let start = i + 1 - period;
        let upper = rolling_max(&high[start..=i]);
        let lower = rolling_min(&low[start..=i]);
        channel.upper[i] = upper;
        channel.lower[i] = lower;
        channel.mid[i] = (upper + lower) / 2.0;
    }

    channel
}

/// Highest value in the window (NEG_INFINITY for an empty window)
pub fn rolling_max(window: &[f64]) -> f64 {
    window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest value in the window (INFINITY for an empty window)
pub fn rolling_min(window: &[f64]) -> f64 {
    window.iter().copied().fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donchian_first_value_at_period_minus_one() {
        let high = vec![10.0, 12.0, 11.0, 15.0];
        let low = vec![8.0, 9.0, 7.0, 10.0];

        let ch = calculate_donchian(&high, &low, 3);

        assert!(ch.upper[0].is_nan() && ch.upper[1].is_nan());
        assert_eq!(ch.upper[2], 12.0);
        assert_eq!(ch.lower[2], 7.0);
        assert_eq!(ch.mid[2], 9.5);
        assert_eq!(ch.upper[3], 15.0);
        assert_eq!(ch.lower[3], 7.0);
    }

    #[test]
    fn test_donchian_insufficient_data() {
        let ch = calculate_donchian(&[1.0, 2.0], &[0.5, 1.5], 20);
        assert_eq!(ch.upper.len(), 2);
        assert!(ch.upper.iter().chain(ch.lower.iter()).all(|v| v.is_nan()));
    }

    #[test]
    fn test_rolling_extremes() {
        assert_eq!(rolling_max(&[1.0, 5.0, 3.0]), 5.0);
        assert_eq!(rolling_min(&[4.0, 2.0, 3.0]), 2.0);
    }
}
