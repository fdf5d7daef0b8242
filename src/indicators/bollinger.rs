// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). The band width is the normalised distance:
// BBW = (upper - lower) / middle * 100.

use serde::{Deserialize, Serialize};

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub bandwidth_pct: f64,
}

impl BollingerResult {
    /// Where `price` sits inside the bands: 0.0 at the lower band, 1.0 at the
    /// upper band. Collapsed bands report 0.5.
    pub fn percent_b(&self, price: f64) -> f64 {
        let span = self.upper - self.lower;
        if span <= 0.0 {
            0.5
        } else {
            (price - self.lower) / span
        }
    }
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `Some(BollingerResult)` containing:
/// - `upper`  = SMA + `num_std` * σ
/// - `middle` = SMA
/// - `lower`  = SMA - `num_std` * σ
/// - `bandwidth_pct` = (upper - lower) / middle * 100
///
/// A zero standard deviation collapses all three bands onto the mean.
///
/// Returns `None` when:
/// - Fewer than `period` data points.
/// - Middle band is zero (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let bandwidth_pct = (upper - lower) / middle * 100.0;

    if bandwidth_pct.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
            bandwidth_pct,
        })
    } else {
        None
    }
}
