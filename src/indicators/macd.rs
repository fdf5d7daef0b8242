// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD line   = EMA(fast) - EMA(slow)
//   Signal line = EMA(signal) of the MACD line
//   Histogram   = MACD line - Signal line
//
// Defaults: fast 12, slow 26, signal 9.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::ema::calculate_ema;

/// Most recent MACD reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdResult {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Full MACD series, aligned to each other (not to the input closes).
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Compute the MACD series.
///
/// The MACD line starts at close index `slow - 1`; the signal line and
/// histogram start `signal - 1` values later. All three vectors are trimmed
/// to the signal line's length so index `k` refers to the same bar in each.
///
/// Returns an empty series when any period is zero, `fast >= slow`, or the
/// history is shorter than `slow + signal`.
pub fn calculate_macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if fast == 0 || slow == 0 || signal == 0 || fast >= slow || closes.len() < slow + signal {
        return MacdSeries::default();
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    // ema_fast[k] belongs to close index k + fast - 1, ema_slow[k] to k + slow - 1.
    let offset = slow - fast;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .filter_map(|(k, &slow_v)| ema_fast.get(k + offset).map(|&fast_v| fast_v - slow_v))
        .collect();

    let signal_line = calculate_ema(&macd_line, signal);
    if signal_line.is_empty() {
        return MacdSeries::default();
    }

    let aligned_macd = macd_line[signal - 1..signal - 1 + signal_line.len()].to_vec();
    let histogram = aligned_macd
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    MacdSeries {
        macd_line: aligned_macd,
        signal_line,
        histogram,
    }
}

/// Most recent MACD reading. All-zero when the history is shorter than
/// `slow + signal` (neutral default, not an error).
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    let series = calculate_macd_series(closes, fast, slow, signal);
    match (
        series.macd_line.last(),
        series.signal_line.last(),
        series.histogram.last(),
    ) {
        (Some(&macd_line), Some(&signal_line), Some(&histogram)) => MacdResult {
            macd_line,
            signal_line,
            histogram,
        },
        _ => MacdResult::default(),
    }
}
