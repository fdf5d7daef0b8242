// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is then the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Only used to calibrate the ZigZag reversal threshold; never surfaced as a
// signal of its own.
// =============================================================================

use crate::types::PriceBar;

/// Compute the most recent ATR value from a slice of bars (oldest first).
///
/// # Returns
/// `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 1` bars (each TR needs a previous close).
/// - Any intermediate value is non-finite.
pub fn calculate_atr(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    // `f64::max` ignores NaN, so non-finite inputs are rejected up front.
    let tr_values: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            if !(cur.high.is_finite() && cur.low.is_finite() && prev.close.is_finite()) {
                return None;
            }
            Some(
                (cur.high - cur.low)
                    .max((cur.high - prev.close).abs())
                    .max((cur.low - prev.close).abs()),
            )
        })
        .collect::<Option<Vec<f64>>>()?;

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let period_f = period as f64;
    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            return None;
        }
    }

    Some(atr)
}

/// ATR as a percentage of the last close, for comparing volatility across
/// price scales.
pub fn calculate_atr_pct(bars: &[PriceBar], period: usize) -> Option<f64> {
    let atr = calculate_atr(bars, period)?;
    let last_close = bars.last()?.close;
    if last_close <= 0.0 {
        return None;
    }
    Some((atr / last_close) * 100.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn atr_period_zero() {
        let bars: Vec<PriceBar> = (0..20).map(|i| bar(i, 100.0, 105.0, 95.0, 102.0)).collect();
        assert!(calculate_atr(&bars, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        let bars: Vec<PriceBar> = (0..10).map(|i| bar(i, 100.0, 105.0, 95.0, 102.0)).collect();
        assert!(calculate_atr(&bars, 14).is_none());
    }

    #[test]
    fn atr_constant_range() {
        let bars: Vec<PriceBar> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                bar(i, base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = calculate_atr(&bars, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10.0, got {atr}");
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        // Gap scenario: |H - prevClose| > H - L
        let bars = vec![
            bar(0, 100.0, 105.0, 95.0, 95.0),
            bar(1, 110.0, 115.0, 108.0, 112.0),
            bar(2, 112.0, 118.0, 110.0, 115.0),
            bar(3, 115.0, 120.0, 113.0, 118.0),
        ];
        let atr = calculate_atr(&bars, 3).unwrap();
        assert!(atr > 7.0, "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn atr_pct_is_relative_to_last_close() {
        let bars: Vec<PriceBar> = (0..30)
            .map(|i| bar(i, 200.0, 202.0, 198.0, 200.0))
            .collect();
        let pct = calculate_atr_pct(&bars, 14).unwrap();
        assert!((pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn atr_nan_returns_none() {
        let bars = vec![
            bar(0, 100.0, 105.0, 95.0, 100.0),
            bar(1, 100.0, f64::NAN, 95.0, 100.0),
            bar(2, 100.0, 105.0, 95.0, 100.0),
            bar(3, 100.0, 105.0, 95.0, 100.0),
        ];
        assert!(calculate_atr(&bars, 3).is_none());
    }
}
