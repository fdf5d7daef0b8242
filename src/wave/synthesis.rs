// =============================================================================
// Multi-View Synthesizer
// =============================================================================
//
// Runs pivot detection and labelling over three trailing windows (~6, ~9 and
// ~12 months of trading days), each with a threshold scaled to its length,
// then reconciles the three verdicts on the wave ring:
//
//   spread <= 1 step   ->  rounded mean,  strong consensus
//   spread <= 2 steps  ->  median view,   moderate consensus
//   otherwise          ->  rounded mean,  weak consensus ("structure unclear")
//
// The reconciled wave is then nudged by three independent checks:
//   - momentum divergence against the trend inside wave 3 or 5
//   - a deep pullback in the long view while calling wave 3
//   - too few weekly pivots to support a wave 4 or 5 call
// =============================================================================

use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::{AnalysisParams, MultiViewParams};
use crate::types::{pct_change, Direction, PriceBar};

use super::divergence::{DivergenceKind, DivergenceResult};
use super::label::{WaveKind, WaveLabel};
use super::labeler::label_waves;
use super::pivot::find_pivots;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Short,
    Mid,
    Long,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "short-term"),
            Self::Mid => write!(f, "mid-term"),
            Self::Long => write!(f, "long-term"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consensus {
    Strong,
    Moderate,
    Weak,
}

/// One window's reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    pub timeframe: Timeframe,
    pub window_bars: usize,
    pub threshold_pct: f64,
    /// Label of the last counted leg, before the view heuristics.
    pub counted_wave: Option<WaveLabel>,
    pub wave: WaveLabel,
    pub pivot_count: usize,
    pub major_pivots: usize,
    pub position_in_range_pct: f64,
    pub gain_from_low_pct: f64,
    pub pullback_from_high_pct: f64,
    pub reason: String,
}

impl ViewResult {
    /// Distance price has moved back against the primary trend from the
    /// window extreme.
    fn frame_retrace(&self, primary: Direction) -> f64 {
        match primary {
            Direction::Up => self.pullback_from_high_pct,
            Direction::Down => self.gain_from_low_pct,
        }
    }

    /// Distance price has travelled with the primary trend from the opposite
    /// window extreme.
    fn frame_progress(&self, primary: Direction) -> f64 {
        match primary {
            Direction::Up => self.gain_from_low_pct,
            Direction::Down => self.pullback_from_high_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub wave: WaveLabel,
    pub confidence: f64,
    pub consensus: Consensus,
    pub reason: String,
    /// Post-reconciliation nudges, in the order applied.
    pub adjustments: Vec<String>,
    pub views: Vec<ViewResult>,
}

/// Wave verdict while it is being nudged.
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    wave: WaveLabel,
    confidence: f64,
    adjustments: Vec<String>,
}

/// Reconcile three windowed readings into one current-wave verdict.
pub fn synthesize(
    bars: &[PriceBar],
    current_price: f64,
    base_threshold_pct: f64,
    primary: Direction,
    divergence: &DivergenceResult,
    params: &AnalysisParams,
) -> SynthesisResult {
    let mv = &params.multi_view;
    let views: Vec<ViewResult> = [
        (Timeframe::Short, mv.short_window, mv.short_threshold_scale),
        (Timeframe::Mid, mv.mid_window, mv.mid_threshold_scale),
        (Timeframe::Long, mv.long_window, mv.long_threshold_scale),
    ]
    .into_iter()
    .map(|(tf, window, scale)| {
        read_view(
            tf,
            &bars[bars.len().saturating_sub(window)..],
            current_price,
            base_threshold_pct * scale,
            primary,
            params,
        )
    })
    .collect();

    let (wave, confidence, consensus, reason) = reconcile(&views, mv);
    let mut verdict = Verdict {
        wave,
        confidence,
        adjustments: Vec::new(),
    };

    nudge_for_divergence(&mut verdict, primary, divergence, mv);
    if let Some(long) = views.last() {
        nudge_for_pullback(&mut verdict, long.frame_retrace(primary), mv);
    }
    cross_check_weekly(&mut verdict, bars, base_threshold_pct, params);

    debug!(
        wave = %verdict.wave,
        confidence = verdict.confidence,
        consensus = ?consensus,
        adjustments = verdict.adjustments.len(),
        "multi-view synthesis"
    );

    SynthesisResult {
        wave: verdict.wave,
        confidence: verdict.confidence.clamp(0.0, 100.0),
        consensus,
        reason,
        adjustments: verdict.adjustments,
        views,
    }
}

// =============================================================================
// Single view
// =============================================================================

fn read_view(
    timeframe: Timeframe,
    window: &[PriceBar],
    price: f64,
    threshold_pct: f64,
    primary: Direction,
    params: &AnalysisParams,
) -> ViewResult {
    let mv = &params.multi_view;
    let scan = find_pivots(window, threshold_pct, &params.zigzag);
    let counted_wave = label_waves(&scan.pivots, primary)
        .cycle
        .last()
        .map(|w| w.label);

    let (lo, hi) = window
        .iter()
        .map(|b| b.close)
        .filter(|c| c.is_finite())
        .fold((f64::MAX, f64::MIN), |(lo, hi), c| (lo.min(c), hi.max(c)));
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (price, price) };

    let mut view = ViewResult {
        timeframe,
        window_bars: window.len(),
        threshold_pct: scan.threshold_pct,
        counted_wave,
        wave: counted_wave.unwrap_or(WaveLabel::One),
        pivot_count: scan.pivots.len(),
        major_pivots: scan.confirmed_count(),
        position_in_range_pct: if hi > lo {
            (price - lo) / (hi - lo) * 100.0
        } else {
            50.0
        },
        gain_from_low_pct: pct_change(lo, price),
        pullback_from_high_pct: if hi > 0.0 { (hi - price) / hi * 100.0 } else { 0.0 },
        reason: String::new(),
    };

    let retrace = view.frame_retrace(primary);
    let progress = view.frame_progress(primary);
    let extreme = match primary {
        Direction::Up => "high",
        Direction::Down => "low",
    };

    view.reason = if view.wave.kind() == WaveKind::Corrective && retrace <= mv.correction_done_pct {
        let finished = view.wave;
        view.wave = finished.next();
        format!(
            "wave {finished} looks complete with price {retrace:.1}% from the window {extreme}"
        )
    } else if view.wave == WaveLabel::One
        && view.major_pivots <= 2
        && progress >= mv.extended_run_pct
    {
        view.wave = WaveLabel::Three;
        format!(
            "single {progress:.0}% run with {} major pivots reads as an extended wave 3",
            view.major_pivots
        )
    } else {
        format!(
            "price at {:.0}% of range, {:+.1}% from low, {:.1}% below high, {} major pivots",
            view.position_in_range_pct,
            view.gain_from_low_pct,
            view.pullback_from_high_pct,
            view.major_pivots
        )
    };

    view
}

// =============================================================================
// Reconciliation
// =============================================================================

fn reconcile(views: &[ViewResult], mv: &MultiViewParams) -> (WaveLabel, f64, Consensus, String) {
    let Some(first) = views.first() else {
        return (
            WaveLabel::One,
            mv.weak_consensus_confidence,
            Consensus::Weak,
            "no views available".to_string(),
        );
    };

    // Unwrap the ring around the short view so "C" and "1" are neighbours.
    let anchor = first.wave;
    let offsets: Vec<i32> = views.iter().map(|v| anchor.ring_delta(v.wave)).collect();
    let min = offsets.iter().copied().min().unwrap_or(0);
    let max = offsets.iter().copied().max().unwrap_or(0);
    let spread = max - min;
    let mean = offsets.iter().sum::<i32>() as f64 / offsets.len() as f64;

    if spread <= 1 {
        let wave = anchor.offset(mean.round() as i32);
        (
            wave,
            mv.strong_consensus_confidence,
            Consensus::Strong,
            format!("all timeframes agree on wave {wave}"),
        )
    } else if spread <= 2 {
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        let wave = anchor.offset(sorted[sorted.len() / 2]);
        let leading = offsets
            .iter()
            .position(|&o| o == max)
            .map(|i| &views[i])
            .unwrap_or(first);
        (
            wave,
            mv.moderate_consensus_confidence,
            Consensus::Moderate,
            format!(
                "timeframes differ; {} view leads at wave {}, taking the median wave {wave}",
                leading.timeframe, leading.wave
            ),
        )
    } else {
        let wave = anchor.offset(mean.round() as i32);
        let readings: Vec<String> = views
            .iter()
            .map(|v| format!("{} {}", v.timeframe, v.wave))
            .collect();
        (
            wave,
            mv.weak_consensus_confidence,
            Consensus::Weak,
            format!(
                "structure unclear: {}; averaging to wave {wave}",
                readings.join(", ")
            ),
        )
    }
}

// =============================================================================
// Nudges
// =============================================================================

fn nudge_for_divergence(
    verdict: &mut Verdict,
    primary: Direction,
    divergence: &DivergenceResult,
    mv: &MultiViewParams,
) {
    let against_trend = matches!(
        (primary, divergence.kind),
        (Direction::Up, DivergenceKind::Bearish) | (Direction::Down, DivergenceKind::Bullish)
    );
    if !against_trend || !matches!(verdict.wave, WaveLabel::Three | WaveLabel::Five) {
        return;
    }
    let was = verdict.wave;
    verdict.wave = WaveLabel::Five;
    verdict.confidence -= mv.divergence_penalty;
    verdict.adjustments.push(format!(
        "{:?} divergence in wave {was} points to a late wave 5",
        divergence.kind
    ));
}

fn nudge_for_pullback(verdict: &mut Verdict, long_retrace_pct: f64, mv: &MultiViewParams) {
    if verdict.wave == WaveLabel::Three && long_retrace_pct > mv.deep_pullback_pct {
        verdict.wave = WaveLabel::Four;
        verdict.adjustments.push(format!(
            "{long_retrace_pct:.1}% pullback is too deep for wave 3, reading wave 4"
        ));
    }
}

fn cross_check_weekly(
    verdict: &mut Verdict,
    bars: &[PriceBar],
    base_threshold_pct: f64,
    params: &AnalysisParams,
) {
    let mv = &params.multi_view;
    let (required, fallback) = match verdict.wave {
        WaveLabel::Four => (mv.weekly_min_pivots_wave4, WaveLabel::Two),
        WaveLabel::Five => (mv.weekly_min_pivots_wave5, WaveLabel::Three),
        _ => return,
    };

    let weekly = resample_weekly(bars);
    let found = find_pivots(&weekly, base_threshold_pct, &params.zigzag).confirmed_count();
    if found < required {
        let was = verdict.wave;
        verdict.wave = fallback;
        verdict.confidence -= mv.weekly_penalty;
        verdict.adjustments.push(format!(
            "weekly chart shows {found} turns, too few for wave {was}; reading wave {fallback}"
        ));
    }
}

/// Aggregate daily bars into ISO-week bars dated on each week's last session.
pub fn resample_weekly(bars: &[PriceBar]) -> Vec<PriceBar> {
    let mut weeks: Vec<PriceBar> = Vec::new();
    let mut current = None;
    for bar in bars {
        let week = bar.date.iso_week();
        match weeks.last_mut() {
            Some(last) if current == Some(week) => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
                last.volume += bar.volume;
                last.date = bar.date;
            }
            _ => {
                weeks.push(bar.clone());
                current = Some(week);
            }
        }
    }
    weeks
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{bars_from_closes, linear, rise_then_pullback};

    fn view(timeframe: Timeframe, wave: WaveLabel) -> ViewResult {
        ViewResult {
            timeframe,
            window_bars: 100,
            threshold_pct: 5.0,
            counted_wave: Some(wave),
            wave,
            pivot_count: 4,
            major_pivots: 3,
            position_in_range_pct: 50.0,
            gain_from_low_pct: 10.0,
            pullback_from_high_pct: 5.0,
            reason: String::new(),
        }
    }

    fn views(waves: [WaveLabel; 3]) -> Vec<ViewResult> {
        vec![
            view(Timeframe::Short, waves[0]),
            view(Timeframe::Mid, waves[1]),
            view(Timeframe::Long, waves[2]),
        ]
    }

    fn verdict(wave: WaveLabel) -> Verdict {
        Verdict {
            wave,
            confidence: 85.0,
            adjustments: Vec::new(),
        }
    }

    #[test]
    fn agreeing_views_are_strong() {
        let mv = MultiViewParams::default();
        let (wave, conf, consensus, reason) =
            reconcile(&views([WaveLabel::Two, WaveLabel::Two, WaveLabel::Three]), &mv);
        assert_eq!(wave, WaveLabel::Two);
        assert_eq!(conf, 85.0);
        assert_eq!(consensus, Consensus::Strong);
        assert!(reason.contains("agree"));
    }

    #[test]
    fn agreement_wraps_around_the_ring() {
        let mv = MultiViewParams::default();
        let (wave, _, consensus, _) =
            reconcile(&views([WaveLabel::C, WaveLabel::One, WaveLabel::One]), &mv);
        assert_eq!(wave, WaveLabel::One);
        assert_eq!(consensus, Consensus::Strong);
    }

    #[test]
    fn moderate_spread_takes_median_and_names_leader() {
        let mv = MultiViewParams::default();
        let (wave, conf, consensus, reason) =
            reconcile(&views([WaveLabel::One, WaveLabel::Two, WaveLabel::Three]), &mv);
        assert_eq!(wave, WaveLabel::Two);
        assert_eq!(conf, 70.0);
        assert_eq!(consensus, Consensus::Moderate);
        assert!(reason.contains("long-term view leads"), "{reason}");
    }

    #[test]
    fn wide_spread_is_unclear() {
        let mv = MultiViewParams::default();
        let (_, conf, consensus, reason) =
            reconcile(&views([WaveLabel::One, WaveLabel::Four, WaveLabel::Two]), &mv);
        assert_eq!(conf, 55.0);
        assert_eq!(consensus, Consensus::Weak);
        assert!(reason.contains("structure unclear"));
    }

    #[test]
    fn bearish_divergence_in_wave3_suggests_wave5() {
        let mv = MultiViewParams::default();
        let divergence = DivergenceResult {
            has_divergence: true,
            kind: DivergenceKind::Bearish,
            confidence: 75.0,
            detail: String::new(),
        };
        let mut v = verdict(WaveLabel::Three);
        nudge_for_divergence(&mut v, Direction::Up, &divergence, &mv);
        assert_eq!(v.wave, WaveLabel::Five);
        assert_eq!(v.confidence, 80.0);

        // Divergence in the direction of the trend changes nothing.
        let mut v = verdict(WaveLabel::Three);
        nudge_for_divergence(&mut v, Direction::Down, &divergence, &mv);
        assert_eq!(v, verdict(WaveLabel::Three));
    }

    #[test]
    fn deep_pullback_demotes_wave3() {
        let mv = MultiViewParams::default();
        let mut v = verdict(WaveLabel::Three);
        nudge_for_pullback(&mut v, 30.0, &mv);
        assert_eq!(v.wave, WaveLabel::Four);

        let mut v = verdict(WaveLabel::Three);
        nudge_for_pullback(&mut v, 10.0, &mv);
        assert_eq!(v.wave, WaveLabel::Three);
    }

    #[test]
    fn weekly_check_demotes_unsupported_wave5() {
        let params = AnalysisParams::default();
        let bars = bars_from_closes(&linear(100.0, 160.0, 60));
        let mut v = verdict(WaveLabel::Five);
        cross_check_weekly(&mut v, &bars, 5.0, &params);
        assert_eq!(v.wave, WaveLabel::Three);
        assert_eq!(v.confidence, 80.0);
        assert_eq!(v.adjustments.len(), 1);
    }

    #[test]
    fn weekly_resample_groups_by_iso_week() {
        // 2024-01-01 is a Monday: 14 days make exactly two weeks.
        let bars = bars_from_closes(&linear(100.0, 113.0, 14));
        let weekly = resample_weekly(&bars);
        assert_eq!(weekly.len(), 2);
        assert!((weekly[0].close - 106.0).abs() < 1e-9);
        assert!((weekly[0].low - 100.0).abs() < 1e-9);
        assert!((weekly[1].high - 113.0).abs() < 1e-9);
        assert_eq!(weekly[1].date, bars[13].date);
    }

    #[test]
    fn rise_then_pullback_reads_wave_two_or_three() {
        let params = AnalysisParams::default();
        let bars = bars_from_closes(&rise_then_pullback());
        let result = synthesize(
            &bars,
            140.0,
            params.zigzag.base_threshold_pct,
            Direction::Up,
            &DivergenceResult::default(),
            &params,
        );
        assert!(
            matches!(result.wave, WaveLabel::Two | WaveLabel::Three),
            "{:?}",
            result
        );
        assert_eq!(result.views.len(), 3);
        assert!((0.0..=100.0).contains(&result.confidence));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let params = AnalysisParams::default();
        let bars = bars_from_closes(&rise_then_pullback());
        let run = || {
            synthesize(&bars, 140.0, 5.0, Direction::Up, &DivergenceResult::default(), &params)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn steady_rise_reads_impulsive() {
        let params = AnalysisParams::default();
        let bars = bars_from_closes(&linear(100.0, 180.0, 60));
        let none = DivergenceResult::default();
        let result = synthesize(&bars, 180.0, 5.0, Direction::Up, &none, &params);
        assert!(matches!(result.wave, WaveLabel::One | WaveLabel::Three));
    }
}
