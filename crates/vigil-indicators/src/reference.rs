//! Pure reference indicator functions over a slice of closing prices
//! (in micros). Each returns `None` when the slice is shorter than the
//! period it needs.

/// Simple moving average over the last `period` closes.
pub fn sma(closes_micros: &[i64], period: usize) -> Option<f64> {
    if period == 0 || closes_micros.len() < period {
        return None;
    }
    let window = &closes_micros[closes_micros.len() - period..];
    let sum: f64 = window.iter().map(|&c| c as f64).sum();
    Some(sum / period as f64)
}

/// Exponential moving average over the full slice, seeded with the SMA of
/// the first `period` values.
pub fn ema(closes_micros: &[i64], period: usize) -> Option<f64> {
    if period == 0 || closes_micros.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = sma(&closes_micros[..period], period)?;
    for &close in &closes_micros[period..] {
        value = alpha * close as f64 + (1.0 - alpha) * value;
    }
    Some(value)
}

/// Wilder's RSI over the last `period + 1` closes (period deltas).
pub fn rsi(closes_micros: &[i64], period: usize) -> Option<f64> {
    if period == 0 || closes_micros.len() < period + 1 {
        return None;
    }
    let start = closes_micros.len() - (period + 1);
    let window = &closes_micros[start..];

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let delta = (pair[1] - pair[0]) as f64;
        if delta >= 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }
    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Average True Range over `period` bars given parallel high/low/close
/// micros slices. True range for the first bar in the window uses only
/// high-low since there is no prior close to compare against.
pub fn atr(highs_micros: &[i64], lows_micros: &[i64], closes_micros: &[i64], period: usize) -> Option<f64> {
    if period == 0
        || highs_micros.len() != lows_micros.len()
        || highs_micros.len() != closes_micros.len()
        || highs_micros.len() < period + 1
    {
        return None;
    }

    let n = highs_micros.len();
    let start = n - (period + 1);
    let mut true_ranges = Vec::with_capacity(period);

    for i in (start + 1)..n {
        let hl = (highs_micros[i] - lows_micros[i]).abs() as f64;
        let hc = (highs_micros[i] - closes_micros[i - 1]).abs() as f64;
        let lc = (lows_micros[i] - closes_micros[i - 1]).abs() as f64;
        true_ranges.push(hl.max(hc).max(lc));
    }

    let sum: f64 = true_ranges.iter().sum();
    Some(sum / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_needs_full_period() {
        assert_eq!(sma(&[1, 2], 3), None);
        assert_eq!(sma(&[1_000_000, 2_000_000, 3_000_000], 3), Some(2_000_000.0));
    }

    #[test]
    fn rsi_is_100_when_all_gains() {
        let closes = vec![100, 101, 102, 103, 104, 105];
        let value = rsi(&closes, 5).unwrap();
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_between_0_and_100_on_mixed_series() {
        let closes = vec![100, 102, 101, 103, 99, 104, 98];
        let value = rsi(&closes, 6).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn ema_tracks_rising_series_upward() {
        let closes = vec![100, 101, 102, 103, 104, 110];
        let value = ema(&closes, 5).unwrap();
        assert!(value > 100.0);
    }

    #[test]
    fn atr_is_nonnegative() {
        let highs = vec![10, 11, 12, 13];
        let lows = vec![8, 9, 9, 10];
        let closes = vec![9, 10, 11, 12];
        let value = atr(&highs, &lows, &closes, 2).unwrap();
        assert!(value >= 0.0);
    }
}
