// =============================================================================
// Target / Stop Projector
// =============================================================================
//
// Projects Fibonacci levels from the legs that anchor the current wave:
//
//   wave 1   1.272x extension of W1, 61.8% pullback
//   wave 2   38.2-78.6% retracements of W1, next leg at 1.618x W1
//   wave 3   1.618x / 2.0x / 2.618x W1 measured from W1's origin
//   wave 4   23.6-50% retracements of W3, W5 sized against W1
//   wave 5   0.618x / 1.0x / 1.618x W1 from the end of W4
//   wave A   38.2-61.8% retracements of the whole impulse
//   wave B   38.2-78.6% bounce of A
//   wave C   1.0x / 1.272x / 1.618x A measured from the end of B
//
// The stop sits where the count itself would be invalidated (for example,
// W1's origin while wave 2 unfolds). Risk/reward is measured in the wave's
// bias direction and is `None` whenever the stop is not on the risk side of
// price.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Direction;

use super::label::WaveLabel;
use super::labeler::{Wave, WaveCycle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSet {
    /// Direction a position should lean while the current wave unfolds.
    pub bias: Direction,
    /// Nearest meaningful level above price.
    pub target_up: Option<f64>,
    /// Nearest meaningful level below price.
    pub target_down: Option<f64>,
    /// Extended objective in the bias direction.
    pub second_target: Option<f64>,
    pub stop_loss: Option<f64>,
    pub fib_levels: Vec<FibLevel>,
    pub risk_reward: Option<f64>,
}

/// Working projection before it is resolved against the current price.
#[derive(Default)]
struct Projection {
    levels: Vec<FibLevel>,
    with_bias: Option<f64>,
    against_bias: Option<f64>,
    second: Option<f64>,
    stop: Option<f64>,
}

impl Projection {
    fn level(&mut self, ratio: f64, price: f64, label: impl Into<String>) -> f64 {
        self.levels.push(FibLevel {
            ratio,
            price,
            label: label.into(),
        });
        price
    }

    /// Retracement levels of `leg` at each ratio, returned in order.
    fn retracements(&mut self, leg: &Wave, ratios: &[f64]) -> Vec<f64> {
        ratios
            .iter()
            .map(|&r| {
                let name = format!("W{} {:.1}% retrace", leg.label, r * 100.0);
                self.level(r, leg.retrace_level(r), name)
            })
            .collect()
    }

    /// `origin + s * r * size` for each ratio, returned in order.
    fn extensions(
        &mut self,
        origin: f64,
        s: f64,
        size: f64,
        ratios: &[f64],
        what: &str,
    ) -> Vec<f64> {
        ratios
            .iter()
            .map(|&r| self.level(r, origin + s * r * size, format!("{what} {r:.3}x")))
            .collect()
    }
}

/// Project price targets, a stop and risk/reward for `wave` at `price`.
pub fn project_targets(
    cycle: &WaveCycle,
    wave: WaveLabel,
    price: f64,
    primary: Direction,
) -> TargetSet {
    let s = primary.sign();
    let w = |label| cycle.get(label);
    let mut p = Projection::default();

    let projected = match wave {
        WaveLabel::One => w(WaveLabel::One).map(|w1| {
            let pullback = p.retracements(w1, &[0.618]);
            let extension = w1.start_price + s * 1.272 * w1.magnitude();
            p.with_bias = Some(p.level(1.272, extension, "W1 1.272x extension"));
            p.against_bias = pullback.first().copied();
            p.stop = Some(w1.start_price);
        }),
        WaveLabel::Two => w(WaveLabel::One).map(|w1| {
            let bands = p.retracements(w1, &[0.382, 0.5, 0.618, 0.786]);
            let base = w(WaveLabel::Two).map(|w2| w2.end_price).unwrap_or(price);
            let wave3 = base + s * 1.618 * w1.magnitude();
            p.with_bias = Some(p.level(1.618, wave3, "W3 at 1.618x W1"));
            p.against_bias = bands.get(2).copied();
            p.stop = Some(w1.start_price);
        }),
        WaveLabel::Three => w(WaveLabel::One).map(|w1| {
            let ratios = [1.618, 2.0, 2.618];
            let ext = p.extensions(w1.start_price, s, w1.magnitude(), &ratios, "W1");
            p.with_bias = ext.first().copied();
            p.second = ext.last().copied();
            p.against_bias = Some(w1.end_price);
            p.stop = Some(w(WaveLabel::Two).map_or(w1.start_price, |w2| w2.end_price));
        }),
        WaveLabel::Four => w(WaveLabel::Three).map(|w3| {
            let bands = p.retracements(w3, &[0.236, 0.382, 0.5]);
            p.against_bias = bands.get(1).copied();
            if let Some(w1) = w(WaveLabel::One) {
                let base = w(WaveLabel::Four).map(|w4| w4.end_price).unwrap_or(price);
                let ratios = [0.618, 1.0, 1.618];
                let ext = p.extensions(base, s, w1.magnitude(), &ratios, "W5 vs W1");
                p.with_bias = ext.get(1).copied();
                p.second = ext.last().copied();
                p.stop = Some(w1.end_price);
            } else {
                p.stop = Some(w3.start_price);
            }
        }),
        WaveLabel::Five => w(WaveLabel::Four).zip(w(WaveLabel::One)).map(|(w4, w1)| {
            let ratios = [0.618, 1.0, 1.618];
            let ext = p.extensions(w4.end_price, s, w1.magnitude(), &ratios, "W5 vs W1");
            p.with_bias = ext.get(1).copied();
            p.second = ext.last().copied();
            p.against_bias = Some(w4.end_price);
            p.stop = Some(w4.end_price);
        }),
        WaveLabel::A => w(WaveLabel::Five).map(|w5| {
            // Whole impulse, from W1's origin when it is still in the cycle.
            let origin = w(WaveLabel::One).map_or(w5.start_price, |w1| w1.start_price);
            let size = (w5.end_price - origin).abs();
            let ratios = [0.382, 0.5, 0.618];
            let bands: Vec<f64> = ratios
                .iter()
                .map(|&r| {
                    let name = format!("impulse {:.1}% retrace", r * 100.0);
                    p.level(r, w5.end_price - s * r * size, name)
                })
                .collect();
            p.with_bias = bands.first().copied();
            p.second = bands.last().copied();
            p.stop = Some(w5.end_price);
        }),
        WaveLabel::B => w(WaveLabel::A).map(|a| {
            let ratios = [0.382, 0.5, 0.618, 0.786];
            let bounce = p.extensions(a.end_price, s, a.magnitude(), &ratios, "B bounce of A");
            p.with_bias = Some(a.end_price);
            p.against_bias = bounce.get(2).copied();
            p.stop = Some(a.start_price);
        }),
        WaveLabel::C => w(WaveLabel::A).zip(w(WaveLabel::B)).map(|(a, b)| {
            let ratios = [1.0, 1.272, 1.618];
            let ext = p.extensions(b.end_price, -s, a.magnitude(), &ratios, "C vs A");
            p.with_bias = ext.first().copied();
            p.second = ext.last().copied();
            p.against_bias = Some(b.end_price);
            p.stop = Some(b.end_price);
        }),
    };

    // Anchoring legs missing: fall back to retracements of the last leg.
    if projected.is_none() {
        p = Projection::default();
        if let Some(last) = cycle.last() {
            let bands = p.retracements(last, &[0.382, 0.5, 0.618]);
            p.against_bias = bands.first().copied();
            p.with_bias = Some(last.end_price + last.direction.sign() * 0.618 * last.magnitude());
            p.stop = Some(last.start_price);
        }
    }

    resolve(p, wave.bias(primary), price)
}

/// Pick up/down targets around `price` and compute risk/reward.
fn resolve(p: Projection, bias: Direction, price: f64) -> TargetSet {
    let (preferred_up, preferred_down) = match bias {
        Direction::Up => (p.with_bias, p.against_bias),
        Direction::Down => (p.against_bias, p.with_bias),
    };

    let nearest_above = p
        .levels
        .iter()
        .map(|l| l.price)
        .filter(|&l| l > price)
        .min_by(f64::total_cmp);
    let nearest_below = p
        .levels
        .iter()
        .map(|l| l.price)
        .filter(|&l| l < price)
        .max_by(f64::total_cmp);

    let target_up = preferred_up.filter(|&t| t > price).or(nearest_above);
    let target_down = preferred_down.filter(|&t| t < price).or(nearest_below);

    let risk_reward = match bias {
        Direction::Up => target_up
            .zip(p.stop)
            .and_then(|(t, stop)| ratio(t - price, price - stop)),
        Direction::Down => target_down
            .zip(p.stop)
            .and_then(|(t, stop)| ratio(price - t, stop - price)),
    };

    TargetSet {
        bias,
        target_up,
        target_down,
        second_target: p.second,
        stop_loss: p.stop,
        fib_levels: p.levels,
        risk_reward,
    }
}

/// `reward / risk`, or `None` when risk is not positive.
fn ratio(reward: f64, risk: f64) -> Option<f64> {
    (risk > 0.0 && reward.is_finite()).then(|| reward / risk)
}
