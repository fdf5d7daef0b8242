// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// RSI compares the size of recent up-moves with recent down-moves.
//
// 1. Take the most recent `period` price changes (deltas).
// 2. avg_gain = sum(gains) / period,  avg_loss = sum(losses) / period
// 3. RS  = avg_gain / avg_loss
//    RSI = 100 - 100 / (1 + RS)
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Neutral value returned when there is not enough history.
pub const NEUTRAL_RSI: f64 = 50.0;

/// RSI over the most recent `period` deltas of `closes`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period + 1` => 50.0 (neutral default)
/// - Average loss of zero with some gains => 100.0
/// - No movement at all => 50.0
/// - Non-finite input => 50.0
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return NEUTRAL_RSI;
    }

    let tail = &closes[closes.len() - period - 1..];
    let (sum_gain, sum_loss) = tail.windows(2).fold((0.0_f64, 0.0_f64), |(g, l), w| {
        let d = w[1] - w[0];
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l - d)
        }
    });

    let period_f = period as f64;
    rsi_from_averages(sum_gain / period_f, sum_loss / period_f).unwrap_or(NEUTRAL_RSI)
}

/// RSI series aligned one-to-one with `closes`.
///
/// Element `i` is the RSI of `closes[..=i]`; indices before the first full
/// window carry the neutral 50.0 so the series can be indexed with the same
/// bar index as the prices.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    (0..closes.len())
        .map(|i| rsi(&closes[..=i], period))
        .collect()
}

/// Oscillator zone of an RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiZone {
    Overbought,
    Oversold,
    Neutral,
}

impl std::fmt::Display for RsiZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overbought => write!(f, "OVERBOUGHT"),
            Self::Oversold => write!(f, "OVERSOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Classify an RSI reading.
pub fn rsi_zone(value: f64) -> RsiZone {
    if value >= 70.0 {
        RsiZone::Overbought
    } else if value <= 30.0 {
        RsiZone::Oversold
    } else {
        RsiZone::Neutral
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// - If both averages are zero, RSI is 50.0 (no movement).
/// - If average loss is zero (only gains), RSI is 100.0.
/// - Returns `None` when the result is non-finite.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        NEUTRAL_RSI
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if rsi.is_finite() {
        Some(rsi)
    } else {
        None
    }
}
