// =============================================================================
// Pivot Detector — Dynamic ZigZag
// =============================================================================
//
// Reduces a close series to alternating swing highs and lows. A running
// extreme becomes a pivot once price reverses from it by at least the
// effective threshold.
//
// The effective threshold scales with the series' total range (highest close
// vs lowest close) so that routine noise in a volatile name is not read as a
// structural turn:
//
//   threshold = max(base, tier(range), min(ATR% * k, cap))
//
// Too few pivots means the threshold was too coarse; the scan is retried with
// a proportionally smaller threshold, a bounded number of times.
//
// The unfinished leg from the last confirmed pivot to the latest bar is always
// appended as a provisional pivot so the series ends at "now".
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::indicators::atr::calculate_atr_pct;
use crate::runtime_config::{ZigzagParams, MAX_ZIGZAG_RETRIES};
use crate::types::{Direction, PriceBar};

/// Swing high or swing low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    pub fn opposite(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

/// A significant local extreme. Consecutive pivots always alternate kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub kind: PivotKind,
    pub price: f64,
    pub index: usize,
    pub date: NaiveDate,
    /// Not yet confirmed by a threshold reversal (the trailing leg).
    pub provisional: bool,
}

/// Output of a pivot scan, including the threshold that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotScan {
    pub pivots: Vec<Pivot>,
    /// Threshold (%) that produced `pivots`, after any retries.
    pub threshold_pct: f64,
    /// Threshold (%) chosen from the series' volatility, before retries.
    pub initial_threshold_pct: f64,
    /// Number of ZigZag passes run (1 + retries).
    pub attempts: usize,
}

impl PivotScan {
    /// Pivots confirmed by a full threshold reversal.
    pub fn confirmed_count(&self) -> usize {
        self.pivots.iter().filter(|p| !p.provisional).count()
    }
}

/// Total range of the closes in percent: (max - min) / min * 100.
/// Returns 0.0 for empty input or a non-positive minimum.
pub fn total_range_pct(closes: &[f64]) -> f64 {
    let finite = closes.iter().copied().filter(|c| c.is_finite());
    let (lo, hi) = finite.fold((f64::MAX, f64::MIN), |(lo, hi), c| (lo.min(c), hi.max(c)));
    if lo <= 0.0 || lo == f64::MAX {
        return 0.0;
    }
    (hi - lo) / lo * 100.0
}

/// Reversal threshold for `bars` given the caller's base threshold.
pub fn effective_threshold(bars: &[PriceBar], base_pct: f64, params: &ZigzagParams) -> f64 {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let range_pct = total_range_pct(&closes);
    let tiered = params.threshold_for_range(range_pct, base_pct);

    let atr_floor = calculate_atr_pct(bars, params.atr_period)
        .map(|atr_pct| (atr_pct * params.atr_multiplier).min(params.atr_floor_cap_pct))
        .unwrap_or(0.0);

    let threshold = tiered.max(atr_floor);
    trace!(
        range_pct = format!("{:.1}", range_pct),
        tiered = format!("{:.2}", tiered),
        atr_floor = format!("{:.2}", atr_floor),
        "zigzag threshold"
    );
    threshold
}

/// Find the pivots of `bars` using a dynamic threshold seeded from
/// `base_threshold_pct`.
pub fn find_pivots(bars: &[PriceBar], base_threshold_pct: f64, params: &ZigzagParams) -> PivotScan {
    let initial = effective_threshold(bars, base_threshold_pct, params);
    let mut threshold = initial;
    let mut pivots = zigzag(bars, threshold, params.tail_fraction);
    let mut attempts = 1;

    let retry_allowed = params.retry_factor > 0.0 && params.retry_factor < 1.0;
    let max_retries = params.max_retries.min(MAX_ZIGZAG_RETRIES);
    while retry_allowed && pivots.len() < params.min_pivots && attempts <= max_retries {
        let next = threshold * params.retry_factor;
        if next < params.min_threshold_pct {
            break;
        }
        threshold = next;
        pivots = zigzag(bars, threshold, params.tail_fraction);
        attempts += 1;
    }

    debug!(
        bars = bars.len(),
        pivots = pivots.len(),
        threshold = format!("{:.2}", threshold),
        attempts,
        "pivot scan complete"
    );

    PivotScan {
        pivots,
        threshold_pct: threshold,
        initial_threshold_pct: initial,
        attempts,
    }
}

/// Absolute percentage move from `from` to `to`; 0.0 for a non-positive base.
fn move_pct(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to - from).abs() / from * 100.0
    } else {
        0.0
    }
}

/// Single ZigZag pass over the closes at a fixed threshold.
fn zigzag(bars: &[PriceBar], threshold_pct: f64, tail_fraction: f64) -> Vec<Pivot> {
    let n = bars.len();
    let close = |i: usize| bars[i].close;
    let pivot = |kind: PivotKind, index: usize, provisional: bool| Pivot {
        kind,
        price: bars[index].close,
        index,
        date: bars[index].date,
        provisional,
    };

    match n {
        0 => return Vec::new(),
        1 => return vec![pivot(PivotKind::Low, 0, true)],
        _ => {}
    }

    let mut pivots = Vec::new();
    let mut trend: Option<Direction> = None;
    let (mut lo_i, mut hi_i) = (0usize, 0usize);
    let mut ext = 0usize;

    for i in 1..n {
        let p = close(i);
        match trend {
            None => {
                if p > close(lo_i) && move_pct(close(lo_i), p) >= threshold_pct {
                    pivots.push(pivot(PivotKind::Low, lo_i, false));
                    trend = Some(Direction::Up);
                    ext = i;
                } else if p < close(hi_i) && move_pct(close(hi_i), p) >= threshold_pct {
                    pivots.push(pivot(PivotKind::High, hi_i, false));
                    trend = Some(Direction::Down);
                    ext = i;
                } else {
                    if p < close(lo_i) {
                        lo_i = i;
                    }
                    if p > close(hi_i) {
                        hi_i = i;
                    }
                }
            }
            Some(Direction::Up) => {
                if p > close(ext) {
                    ext = i;
                } else if move_pct(close(ext), p) >= threshold_pct {
                    pivots.push(pivot(PivotKind::High, ext, false));
                    trend = Some(Direction::Down);
                    ext = i;
                }
            }
            Some(Direction::Down) => {
                if p < close(ext) {
                    ext = i;
                } else if move_pct(close(ext), p) >= threshold_pct {
                    pivots.push(pivot(PivotKind::Low, ext, false));
                    trend = Some(Direction::Up);
                    ext = i;
                }
            }
        }
    }

    let last = n - 1;
    match trend {
        // No reversal ever cleared the threshold: one leg from first to last.
        None => {
            let first_kind = if close(last) >= close(0) {
                PivotKind::Low
            } else {
                PivotKind::High
            };
            pivots.push(pivot(first_kind, 0, false));
            pivots.push(pivot(first_kind.opposite(), last, true));
        }
        Some(dir) => {
            let ext_kind = match dir {
                Direction::Up => PivotKind::High,
                Direction::Down => PivotKind::Low,
            };
            if ext == last {
                pivots.push(pivot(ext_kind, last, true));
            } else if move_pct(close(ext), close(last)) >= threshold_pct * tail_fraction {
                pivots.push(pivot(ext_kind, ext, true));
                pivots.push(pivot(ext_kind.opposite(), last, true));
            } else {
                // Retrace too small to matter: the running leg ends at now.
                pivots.push(pivot(ext_kind, last, true));
            }
        }
    }

    pivots
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{bars_from_closes, linear, rise_then_pullback};

    fn assert_alternating(pivots: &[Pivot]) {
        for pair in pivots.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind, "pivots must alternate: {pivots:?}");
            assert!(pair[0].index < pair[1].index);
        }
    }

    fn scan(closes: &[f64]) -> PivotScan {
        let params = ZigzagParams::default();
        find_pivots(&bars_from_closes(closes), params.base_threshold_pct, &params)
    }

    #[test]
    fn strictly_increasing_yields_one_pivot_pair() {
        let closes = linear(100.0, 180.0, 60);
        let result = scan(&closes);
        assert_eq!(result.pivots.len(), 2);
        assert_eq!(result.pivots[0].kind, PivotKind::Low);
        assert_eq!(result.pivots[0].index, 0);
        assert_eq!(result.pivots[1].kind, PivotKind::High);
        assert_eq!(result.pivots[1].index, 59);
        assert!(result.pivots[1].provisional);
    }

    #[test]
    fn rise_then_pullback_has_three_pivots() {
        let result = scan(&rise_then_pullback());
        let p = &result.pivots;
        assert_eq!(p.len(), 3);
        assert_eq!((p[0].kind, p[0].index), (PivotKind::Low, 0));
        assert_eq!((p[1].kind, p[1].index), (PivotKind::High, 24));
        assert_eq!((p[2].kind, p[2].index), (PivotKind::Low, 39));
        assert!((p[2].price - 140.0).abs() < 1e-9);
        assert!(p[2].provisional);
    }

    #[test]
    fn clear_swings_are_all_found() {
        let mut closes = linear(100.0, 130.0, 11);
        for (from, to) in [(130.0, 110.0), (110.0, 140.0), (140.0, 120.0)] {
            closes.extend_from_slice(&linear(from, to, 11)[1..]);
        }
        let result = scan(&closes);
        let prices: Vec<f64> = result.pivots.iter().map(|p| p.price).collect();
        assert_eq!(prices.len(), 5, "{prices:?}");
        for (got, want) in prices.iter().zip([100.0, 130.0, 110.0, 140.0, 120.0]) {
            assert!((got - want).abs() < 1e-9);
        }
        assert_alternating(&result.pivots);
        assert_eq!(result.confirmed_count(), 4);
    }

    #[test]
    fn coarse_threshold_is_retried_smaller() {
        // 4% swings are invisible at the 5% base threshold.
        let mut closes = vec![100.0];
        for k in 0..6 {
            let (from, to) = if k % 2 == 0 { (100.0, 104.0) } else { (104.0, 100.0) };
            closes.extend_from_slice(&linear(from, to, 6)[1..]);
        }
        let result = scan(&closes);
        assert!(result.attempts > 1);
        assert!(result.threshold_pct < result.initial_threshold_pct);
        assert!(result.pivots.len() >= 4, "{:?}", result.pivots);
        assert_alternating(&result.pivots);
    }

    #[test]
    fn retries_are_bounded() {
        let mut params = ZigzagParams::default();
        params.max_retries = 0;
        let closes = vec![100.0, 101.0, 100.0, 101.0, 100.0, 101.0];
        let result = find_pivots(&bars_from_closes(&closes), 5.0, &params);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.pivots.len(), 2);
    }

    #[test]
    fn oversized_retry_budget_is_capped() {
        let mut params = ZigzagParams::default();
        params.max_retries = 200_000;
        params.min_threshold_pct = 0.0;
        let result = find_pivots(&bars_from_closes(&[100.0; 250]), 5.0, &params);
        assert_eq!(result.attempts, MAX_ZIGZAG_RETRIES + 1);
        assert!(result.threshold_pct > 0.01, "{}", result.threshold_pct);
        assert_eq!(result.pivots.len(), 2);
    }

    #[test]
    fn flat_series_falls_back_to_single_leg() {
        let result = scan(&[100.0; 40]);
        assert_eq!(result.pivots.len(), 2);
        assert_eq!(result.pivots[0].index, 0);
        assert_eq!(result.pivots[1].index, 39);
        assert_alternating(&result.pivots);
    }

    #[test]
    fn small_tail_retrace_still_ends_at_now() {
        let mut closes = linear(100.0, 150.0, 30);
        closes.push(149.0);
        closes.push(148.5);
        let result = scan(&closes);
        let last = result.pivots.last().unwrap();
        assert_eq!(result.pivots.len(), 2);
        assert_eq!(last.index, 31);
        assert_eq!(last.kind, PivotKind::High);
        assert!((last.price - 148.5).abs() < 1e-9);
    }

    #[test]
    fn downtrend_starts_with_high() {
        let closes = linear(200.0, 120.0, 50);
        let result = scan(&closes);
        assert_eq!(result.pivots[0].kind, PivotKind::High);
        assert_eq!(result.pivots.last().unwrap().kind, PivotKind::Low);
    }

    #[test]
    fn effective_threshold_grows_with_range() {
        let params = ZigzagParams::default();
        let mut prev = 0.0;
        for range in [20.0, 80.0, 150.0, 300.0] {
            let bars = bars_from_closes(&linear(100.0, 100.0 * (1.0 + range / 100.0), 60));
            let t = effective_threshold(&bars, params.base_threshold_pct, &params);
            assert!(t >= prev, "range {range}%: threshold {t} < previous {prev}");
            prev = t;
        }
        assert!((prev - 12.0).abs() < 1e-9);
    }

    #[test]
    fn atr_floor_lifts_threshold_for_noisy_bars() {
        let params = ZigzagParams::default();
        let bars: Vec<PriceBar> = bars_from_closes(&[100.0; 40])
            .into_iter()
            .map(|mut b| {
                b.high = 104.0;
                b.low = 96.0;
                b
            })
            .collect();
        // ATR 8% * 1.5 = 12%, capped at 8%.
        let t = effective_threshold(&bars, 5.0, &params);
        assert!((t - params.atr_floor_cap_pct).abs() < 1e-9);
    }

    #[test]
    fn total_range_guards() {
        assert_eq!(total_range_pct(&[]), 0.0);
        assert_eq!(total_range_pct(&[0.0, 10.0]), 0.0);
        assert!((total_range_pct(&[100.0, 250.0, 120.0]) - 150.0).abs() < 1e-9);
    }
}
