// =============================================================================
// RSI Divergence Detector
// =============================================================================
//
// Bearish: price pushes to (or within a few % of) the window's high in the
// final third of the look-back while RSI at that bar sits materially below
// an earlier RSI peak. Bullish is the mirror at the lows.
//
// RSI is computed over the whole history so the first values inside the
// window already carry a full averaging period. Bearish is tested first and
// at most one kind is reported.
// =============================================================================

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::rsi::rsi_series;
use crate::runtime_config::DivergenceParams;
use crate::types::{closes, PriceBar};

/// Fewest window bars the detector will work with.
const MIN_WINDOW: usize = 6;
const BASE_CONFIDENCE: f64 = 60.0;
const MAX_GAP_BONUS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    Bullish,
    Bearish,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceResult {
    pub has_divergence: bool,
    pub kind: DivergenceKind,
    /// 0 when no divergence, otherwise 60-90 scaled by the RSI gap.
    pub confidence: f64,
    pub detail: String,
}

impl DivergenceResult {
    fn none(detail: impl Into<String>) -> Self {
        Self {
            has_divergence: false,
            kind: DivergenceKind::None,
            confidence: 0.0,
            detail: detail.into(),
        }
    }

    fn found(kind: DivergenceKind, gap: f64, detail: String) -> Self {
        Self {
            has_divergence: true,
            kind,
            confidence: BASE_CONFIDENCE + gap.min(MAX_GAP_BONUS),
            detail,
        }
    }
}

impl Default for DivergenceResult {
    fn default() -> Self {
        Self::none("no divergence")
    }
}

/// Index of the first maximum (or minimum) of `values` within `range`,
/// skipping non-finite entries.
fn arg_extreme(values: &[f64], range: Range<usize>, want_max: bool) -> Option<usize> {
    range
        .filter(|&i| values[i].is_finite())
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if want_max && values[i] <= values[b] => Some(b),
            Some(b) if !want_max && values[i] >= values[b] => Some(b),
            _ => Some(i),
        })
}

/// Look for a bearish or bullish RSI divergence in the trailing window.
pub fn detect_divergence(bars: &[PriceBar], params: &DivergenceParams) -> DivergenceResult {
    let prices = closes(bars);
    let n = prices.len();
    let start = n.saturating_sub(params.lookback);
    if n - start < MIN_WINDOW {
        return DivergenceResult::none("not enough bars for divergence");
    }

    let rsi = rsi_series(&prices, params.rsi_period);
    let recent_start = n - ((n - start) / 3).max(3);
    let near = params.near_extreme_pct / 100.0;
    let gap_ratio = params.min_rsi_gap_pct / 100.0;

    // Bearish: a near-high price with a weaker RSI than an earlier peak.
    if let (Some(rh), Some(window_high)) = (
        arg_extreme(&prices, recent_start..n, true),
        arg_extreme(&prices, start..n, true),
    ) {
        let peak_end = (rh + 1).saturating_sub(params.min_peak_separation);
        if prices[rh] >= prices[window_high] * (1.0 - near) && peak_end > start {
            if let Some(pp) = arg_extreme(&rsi, start..peak_end, true) {
                if rsi[rh] <= rsi[pp] * (1.0 - gap_ratio) {
                    let gap = rsi[pp] - rsi[rh];
                    debug!(
                        price = prices[rh],
                        rsi_now = format!("{:.1}", rsi[rh]),
                        rsi_peak = format!("{:.1}", rsi[pp]),
                        "bearish divergence"
                    );
                    return DivergenceResult::found(
                        DivergenceKind::Bearish,
                        gap,
                        format!(
                            "price {:.2} near window high {:.2}, RSI {:.1} vs earlier peak {:.1} on {}",
                            prices[rh], prices[window_high], rsi[rh], rsi[pp], bars[pp].date
                        ),
                    );
                }
            }
        }
    }

    // Bullish: a near-low price with a stronger RSI than an earlier trough.
    if let (Some(rl), Some(window_low)) = (
        arg_extreme(&prices, recent_start..n, false),
        arg_extreme(&prices, start..n, false),
    ) {
        let trough_end = (rl + 1).saturating_sub(params.min_peak_separation);
        if prices[rl] <= prices[window_low] * (1.0 + near) && trough_end > start {
            if let Some(pt) = arg_extreme(&rsi, start..trough_end, false) {
                if rsi[rl] >= rsi[pt] * (1.0 + gap_ratio) {
                    let gap = rsi[rl] - rsi[pt];
                    debug!(
                        price = prices[rl],
                        rsi_now = format!("{:.1}", rsi[rl]),
                        rsi_trough = format!("{:.1}", rsi[pt]),
                        "bullish divergence"
                    );
                    return DivergenceResult::found(
                        DivergenceKind::Bullish,
                        gap,
                        format!(
                            "price {:.2} near window low {:.2}, RSI {:.1} vs earlier trough {:.1} on {}",
                            prices[rl], prices[window_low], rsi[rl], rsi[pt], bars[pt].date
                        ),
                    );
                }
            }
        }
    }

    DivergenceResult::none("price and RSI extremes agree")
}
