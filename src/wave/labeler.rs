// =============================================================================
// Wave Labeler
// =============================================================================
//
// Walks the legs between consecutive pivots and assigns each one the next
// label on the Elliott ring. Counting starts at the most extreme pivot that
// fits the primary trend: the lowest low for an uptrend, the highest high for
// a downtrend.
//
// A leg whose direction contradicts the label expected at its position is not
// dropped. It takes a direction-consistent substitute from FALLBACKS and the
// count resumes from there.
//
// Only the latest cycle (at most eight legs) stays in the active WaveCycle.
// Each new wave 1 retires the previous cycle into the history list.
// =============================================================================

use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{pct_change, Direction};

use super::label::{WaveKind, WaveLabel, CYCLE_LEN};
use super::pivot::{Pivot, PivotKind};

// =============================================================================
// Wave
// =============================================================================

/// A labelled price move between two consecutive pivots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub label: WaveLabel,
    pub kind: WaveKind,
    pub direction: Direction,
    pub start_price: f64,
    pub end_price: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub change_pct: f64,
    /// Size of this leg relative to the leg before it in the same cycle.
    pub fib_ratio_to_prior: Option<f64>,
    /// Ends on the unconfirmed trailing pivot.
    pub provisional: bool,
}

impl Wave {
    /// Absolute price distance covered.
    pub fn magnitude(&self) -> f64 {
        (self.end_price - self.start_price).abs()
    }

    /// Price after giving back `ratio` of this leg from its end.
    pub fn retrace_level(&self, ratio: f64) -> f64 {
        self.end_price - self.direction.sign() * ratio * self.magnitude()
    }

    /// Fraction of `prior` that this leg covers (0.0 when `prior` is flat).
    pub fn ratio_to(&self, prior: &Wave) -> f64 {
        let base = prior.magnitude();
        if base > 0.0 {
            self.magnitude() / base
        } else {
            0.0
        }
    }
}

// =============================================================================
// WaveCycle — bounded ring of the most recent legs
// =============================================================================

/// The active cycle: up to eight consecutive labelled legs, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveCycle {
    waves: VecDeque<Wave>,
}

impl WaveCycle {
    pub const CAPACITY: usize = CYCLE_LEN;

    pub fn new() -> Self {
        Self {
            waves: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    /// Append a leg. Returns the oldest leg if capacity was exceeded.
    pub fn push(&mut self, wave: Wave) -> Option<Wave> {
        let evicted = if self.waves.len() >= Self::CAPACITY {
            self.waves.pop_front()
        } else {
            None
        };
        self.waves.push_back(wave);
        evicted
    }

    /// Most recent leg carrying `label`.
    pub fn get(&self, label: WaveLabel) -> Option<&Wave> {
        self.waves.iter().rev().find(|w| w.label == label)
    }

    pub fn last(&self) -> Option<&Wave> {
        self.waves.back()
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wave> {
        self.waves.iter()
    }

    /// Empty the cycle, returning its legs oldest first.
    pub fn drain(&mut self) -> Vec<Wave> {
        self.waves.drain(..).collect()
    }
}

// =============================================================================
// Labelling
// =============================================================================

/// Substitute label for a leg that moved against the expected direction,
/// and the label expected on the leg after it.
///
/// Every substitute moves in the direction actually observed, so the count
/// stays consistent without skipping the leg.
const FALLBACKS: [(WaveLabel, WaveLabel, WaveLabel); CYCLE_LEN] = [
    // with-trend leg where a correction was expected
    (WaveLabel::Two, WaveLabel::Three, WaveLabel::Four),
    (WaveLabel::Four, WaveLabel::Five, WaveLabel::A),
    (WaveLabel::A, WaveLabel::B, WaveLabel::C),
    (WaveLabel::C, WaveLabel::One, WaveLabel::Two),
    // counter-trend leg where a with-trend wave was expected
    (WaveLabel::One, WaveLabel::C, WaveLabel::One),
    (WaveLabel::Three, WaveLabel::Two, WaveLabel::Three),
    (WaveLabel::Five, WaveLabel::Four, WaveLabel::Five),
    (WaveLabel::B, WaveLabel::A, WaveLabel::B),
];

fn fallback_for(expected: WaveLabel) -> (WaveLabel, WaveLabel) {
    FALLBACKS
        .iter()
        .find(|(e, _, _)| *e == expected)
        .map(|(_, label, next)| (*label, *next))
        // FALLBACKS covers all eight labels.
        .unwrap_or((expected, expected.next()))
}

/// Result of labelling a pivot sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledWaves {
    pub cycle: WaveCycle,
    /// Legs from earlier, completed cycles, oldest first.
    pub history: Vec<Wave>,
    /// Legs that needed a substitute label.
    pub fallbacks: usize,
}

/// Index of the pivot the count starts from.
fn anchor_index(pivots: &[Pivot], primary: Direction) -> usize {
    let candidate = match primary {
        Direction::Up => pivots
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == PivotKind::Low)
            .min_by(|a, b| a.1.price.total_cmp(&b.1.price)),
        Direction::Down => pivots
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == PivotKind::High)
            .max_by(|a, b| a.1.price.total_cmp(&b.1.price).then(b.0.cmp(&a.0))),
    }
    .map(|(i, _)| i)
    .unwrap_or(0);

    // An anchor on the final pivot leaves no legs to count.
    if candidate + 1 >= pivots.len() {
        0
    } else {
        candidate
    }
}

/// Label the legs between `pivots` under the given primary trend.
pub fn label_waves(pivots: &[Pivot], primary: Direction) -> LabeledWaves {
    let mut out = LabeledWaves::default();
    if pivots.len() < 2 {
        return out;
    }

    let anchor = anchor_index(pivots, primary);
    let mut expected = WaveLabel::One;

    for leg in pivots[anchor..].windows(2) {
        let (from, to) = (&leg[0], &leg[1]);
        let direction = Direction::of_move(from.price, to.price);

        let (label, next) = if direction == expected.canonical_direction(primary) {
            (expected, expected.next())
        } else {
            out.fallbacks += 1;
            let (label, next) = fallback_for(expected);
            debug!(
                expected = %expected,
                substitute = %label,
                date = %to.date,
                "leg direction disagrees with count, using fallback label"
            );
            (label, next)
        };

        if label == WaveLabel::One && !out.cycle.is_empty() {
            out.history.extend(out.cycle.drain());
        }

        let fib_ratio_to_prior = out.cycle.last().and_then(|prior| {
            let base = prior.magnitude();
            (base > 0.0).then(|| (to.price - from.price).abs() / base)
        });

        let wave = Wave {
            label,
            kind: label.kind(),
            direction,
            start_price: from.price,
            end_price: to.price,
            start_index: from.index,
            end_index: to.index,
            start_date: from.date,
            end_date: to.date,
            change_pct: pct_change(from.price, to.price),
            fib_ratio_to_prior,
            provisional: to.provisional,
        };
        if let Some(evicted) = out.cycle.push(wave) {
            out.history.push(evicted);
        }
        expected = next;
    }

    out
}

// =============================================================================
// Primary trend
// =============================================================================

/// Infer the primary trend from the order of the extreme closes.
///
/// The lowest close preceding the highest close reads as an uptrend, and the
/// reverse as a downtrend, unless price has since given back more than
/// `reversal_fraction` of the move between the two extremes. A flat series is
/// an uptrend.
pub fn infer_primary_trend(closes: &[f64], reversal_fraction: f64) -> Direction {
    let finite: Vec<(usize, f64)> = closes
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, c)| c.is_finite())
        .collect();
    let (Some(&(lo_i, lo)), Some(&(hi_i, hi)), Some(&(_, last))) = (
        finite.iter().min_by(|a, b| a.1.total_cmp(&b.1)),
        finite.iter().max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0))),
        finite.last(),
    ) else {
        return Direction::Up;
    };

    let span = hi - lo;
    if span <= 0.0 {
        return Direction::Up;
    }

    if lo_i <= hi_i {
        if (hi - last) > reversal_fraction * span {
            Direction::Down
        } else {
            Direction::Up
        }
    } else if (last - lo) > reversal_fraction * span {
        Direction::Up
    } else {
        Direction::Down
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Pivots at the given prices, alternating kind from `first`, one per 5 days.
    fn pivots(first: PivotKind, prices: &[f64]) -> Vec<Pivot> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut kind = first;
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| {
                let p = Pivot {
                    kind,
                    price,
                    index: i * 5,
                    date: start + Duration::days(i as i64 * 5),
                    provisional: i + 1 == prices.len(),
                };
                kind = kind.opposite();
                p
            })
            .collect()
    }

    fn labels(cycle: &WaveCycle) -> Vec<WaveLabel> {
        cycle.iter().map(|w| w.label).collect()
    }

    #[test]
    fn rise_then_pullback_is_one_two() {
        let out = label_waves(&pivots(PivotKind::Low, &[100.0, 150.0, 140.0]), Direction::Up);
        assert_eq!(labels(&out.cycle), vec![WaveLabel::One, WaveLabel::Two]);

        let w1 = out.cycle.get(WaveLabel::One).unwrap();
        assert_eq!(w1.direction, Direction::Up);
        assert!((w1.change_pct - 50.0).abs() < 1e-9);
        let w2 = out.cycle.get(WaveLabel::Two).unwrap();
        assert_eq!(w2.direction, Direction::Down);
        assert!((w2.fib_ratio_to_prior.unwrap() - 0.2).abs() < 1e-9);
        assert!(w2.provisional);
        assert_eq!(out.fallbacks, 0);
    }

    #[test]
    fn count_starts_at_lowest_low() {
        let out = label_waves(
            &pivots(PivotKind::High, &[120.0, 100.0, 150.0, 130.0]),
            Direction::Up,
        );
        assert_eq!(labels(&out.cycle), vec![WaveLabel::One, WaveLabel::Two]);
        assert!((out.cycle.get(WaveLabel::One).unwrap().start_price - 100.0).abs() < 1e-9);
        assert!(out.history.is_empty());
    }

    #[test]
    fn downtrend_count_is_mirrored() {
        let out = label_waves(
            &pivots(PivotKind::High, &[200.0, 150.0, 170.0, 120.0]),
            Direction::Down,
        );
        assert_eq!(
            labels(&out.cycle),
            vec![WaveLabel::One, WaveLabel::Two, WaveLabel::Three]
        );
        assert_eq!(out.cycle.get(WaveLabel::Two).unwrap().direction, Direction::Up);
    }

    #[test]
    fn contrary_first_leg_takes_fallback_label() {
        // Lowest low is the final pivot, so counting starts at the first one.
        let out = label_waves(&pivots(PivotKind::High, &[150.0, 100.0]), Direction::Up);
        assert_eq!(labels(&out.cycle), vec![WaveLabel::C]);
        assert_eq!(out.fallbacks, 1);
    }

    #[test]
    fn fallback_table_is_direction_consistent() {
        for primary in [Direction::Up, Direction::Down] {
            for (expected, label, next) in FALLBACKS {
                assert_ne!(
                    expected.canonical_direction(primary),
                    label.canonical_direction(primary)
                );
                assert_ne!(
                    label.canonical_direction(primary),
                    next.canonical_direction(primary)
                );
            }
        }
    }

    #[test]
    fn new_wave_one_retires_previous_cycle() {
        let prices = [100.0, 150.0, 130.0, 200.0, 180.0, 220.0, 190.0, 210.0, 170.0, 185.0];
        let out = label_waves(&pivots(PivotKind::Low, &prices), Direction::Up);
        assert_eq!(out.history.len(), 8);
        assert_eq!(out.history[7].label, WaveLabel::C);
        assert_eq!(labels(&out.cycle), vec![WaveLabel::One]);
        assert!((out.cycle.last().unwrap().start_price - 170.0).abs() < 1e-9);
        assert_eq!(out.cycle.last().unwrap().fib_ratio_to_prior, None);
    }

    #[test]
    fn cycle_evicts_oldest_past_capacity() {
        let template = label_waves(&pivots(PivotKind::Low, &[100.0, 110.0]), Direction::Up)
            .cycle
            .last()
            .cloned()
            .unwrap();
        let mut cycle = WaveCycle::new();
        for i in 0..WaveCycle::CAPACITY {
            let mut w = template.clone();
            w.start_index = i;
            assert!(cycle.push(w).is_none());
        }
        let evicted = cycle.push(template.clone()).unwrap();
        assert_eq!(evicted.start_index, 0);
        assert_eq!(cycle.len(), WaveCycle::CAPACITY);
    }

    #[test]
    fn too_few_pivots_yield_empty_cycle() {
        assert!(label_waves(&[], Direction::Up).cycle.is_empty());
        let one = pivots(PivotKind::Low, &[100.0]);
        assert!(label_waves(&one, Direction::Up).cycle.is_empty());
    }

    #[test]
    fn retrace_level_moves_against_leg() {
        let out = label_waves(&pivots(PivotKind::Low, &[100.0, 150.0]), Direction::Up);
        let w1 = out.cycle.last().unwrap();
        assert!((w1.retrace_level(0.618) - 119.1).abs() < 1e-9);
    }

    #[test]
    fn primary_trend_from_extreme_order() {
        assert_eq!(infer_primary_trend(&[100.0, 150.0, 140.0], 0.5), Direction::Up);
        assert_eq!(infer_primary_trend(&[150.0, 100.0, 110.0], 0.5), Direction::Down);
        // Fell 50, recovered 40 of it.
        assert_eq!(infer_primary_trend(&[150.0, 100.0, 140.0], 0.5), Direction::Up);
        // Rose 50, gave back 40 of it.
        assert_eq!(infer_primary_trend(&[100.0, 150.0, 110.0], 0.5), Direction::Down);
        assert_eq!(infer_primary_trend(&[100.0; 10], 0.5), Direction::Up);
        assert_eq!(infer_primary_trend(&[], 0.5), Direction::Up);
    }
}
