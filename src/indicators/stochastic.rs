// =============================================================================
// Stochastic Oscillator (KD)
// =============================================================================
//
// RSV = (close - lowest low(n)) / (highest high(n) - lowest low(n)) * 100
// K_t = K_{t-1} * 2/3 + RSV_t * 1/3
// D_t = D_{t-1} * 2/3 + K_t   * 1/3
//
// K and D are seeded at 50. A flat look-back range yields RSV 50.
// Default period: 9.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::PriceBar;

/// Most recent K and D values, both in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdResult {
    pub k: f64,
    pub d: f64,
}

impl KdResult {
    /// K above D.
    pub fn is_golden(&self) -> bool {
        self.k > self.d
    }
}

/// Compute the KD oscillator over `bars` using an `period`-bar RSV.
///
/// Returns `None` when `period` is zero, there are fewer than `period` bars,
/// or a non-finite value shows up.
pub fn calculate_kd(bars: &[PriceBar], period: usize) -> Option<KdResult> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let mut k = 50.0_f64;
    let mut d = 50.0_f64;

    for end in period..=bars.len() {
        let window = &bars[end - period..end];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = window[period - 1].close;

        let span = highest - lowest;
        let rsv = if span > 0.0 {
            ((close - lowest) / span * 100.0).clamp(0.0, 100.0)
        } else {
            50.0
        };

        k = k * 2.0 / 3.0 + rsv / 3.0;
        d = d * 2.0 / 3.0 + k / 3.0;

        if !(k.is_finite() && d.is_finite()) {
            return None;
        }
    }

    Some(KdResult { k, d })
}
