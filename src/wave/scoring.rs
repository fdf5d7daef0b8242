// =============================================================================
// Confidence Scorer & Advisor
// =============================================================================
//
// Score starts at the configured base (50) and moves by fixed increments:
//
//   + per applicable cardinal rule that held     - per rule broken
//   + per satisfied guideline
//   + MACD / KD confirming the bias               - RSI stretched in the bias direction
//   + divergence with the bias                    - divergence against it
//   + risk/reward at or above 2:1, more at 3:1
//
// The result is clamped to [0, 100], bucketed into a level, and paired with
// a wave-specific action and narrative.
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::indicators::{RsiZone, TechnicalSnapshot};
use crate::runtime_config::ScoringParams;
use crate::types::Direction;

use super::divergence::{DivergenceKind, DivergenceResult};
use super::label::WaveLabel;
use super::rules::RuleReport;
use super::targets::TargetSet;

/// Below this score a buy or add is softened to hold.
const MIN_SCORE_TO_ADD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 20.0 => Self::VeryLow,
            s if s < 40.0 => Self::Low,
            s if s < 60.0 => Self::Medium,
            s if s < 80.0 => Self::High,
            _ => Self::VeryHigh,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VeryLow => "VERY LOW",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY HIGH",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Add,
    Hold,
    ScaleOut,
    Sell,
    StayOut,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Add => "ADD",
            Self::Hold => "HOLD",
            Self::ScaleOut => "SCALE OUT",
            Self::Sell => "SELL",
            Self::StayOut => "STAY OUT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub action: Action,
    pub suggestion: String,
    /// One line per score adjustment, in the order applied.
    pub details: Vec<String>,
}

/// Everything the scorer reads.
pub struct ScoreInputs<'a> {
    pub wave: WaveLabel,
    pub primary: Direction,
    pub rules: &'a RuleReport,
    pub technicals: &'a TechnicalSnapshot,
    pub targets: &'a TargetSet,
    pub divergence: &'a DivergenceResult,
}

struct Tally<'p> {
    score: f64,
    details: Vec<String>,
    params: &'p ScoringParams,
}

impl Tally<'_> {
    fn add(&mut self, points: f64, why: String) {
        self.score += points;
        self.details.push(format!("{points:+.0} {why}"));
    }
}

/// Score the analysis and recommend an action.
pub fn score(inputs: &ScoreInputs<'_>, params: &ScoringParams) -> Advice {
    let bias = inputs.wave.bias(inputs.primary);
    let mut t = Tally {
        score: params.base_score,
        details: Vec::new(),
        params,
    };

    score_rules(&mut t, inputs.rules);
    score_momentum(&mut t, inputs.technicals, bias);
    score_divergence(&mut t, inputs.divergence, bias);
    score_risk_reward(&mut t, inputs.targets.risk_reward);

    let score = t.score.clamp(0.0, 100.0);
    let (mut action, narrative) = advise(inputs.wave, inputs.primary);
    if score < MIN_SCORE_TO_ADD && matches!(action, Action::Buy | Action::Add) {
        t.details
            .push(format!("score {score:.0} too low to add exposure, holding instead"));
        action = Action::Hold;
    }

    Advice {
        score,
        level: ConfidenceLevel::from_score(score),
        action,
        suggestion: suggestion(inputs.wave, narrative, inputs.targets, inputs.rules),
        details: t.details,
    }
}

fn score_rules(t: &mut Tally<'_>, rules: &RuleReport) {
    let (pass, fail, guideline) = (
        t.params.rule_pass_points,
        t.params.rule_fail_penalty,
        t.params.guideline_points,
    );
    for r in rules.rules.iter().filter(|r| r.applicable) {
        if r.passed {
            t.add(pass, format!("rule holds: {}", r.name));
        } else {
            t.add(-fail, format!("rule broken: {} ({})", r.name, r.detail));
        }
    }
    for g in rules.guidelines.iter().filter(|g| g.applicable && g.satisfied) {
        t.add(guideline, format!("guideline met: {}", g.name));
    }
}

fn score_momentum(t: &mut Tally<'_>, tech: &TechnicalSnapshot, bias: Direction) {
    let p = t.params;
    let hist = tech.macd.histogram;
    let macd_confirms = match bias {
        Direction::Up => hist > 0.0,
        Direction::Down => hist < 0.0,
    };
    if macd_confirms {
        t.add(
            p.momentum_confirm_points,
            format!("MACD histogram {hist:+.3} confirms {bias} bias"),
        );
    }

    let stretched = matches!(
        (bias, tech.rsi_zone),
        (Direction::Up, RsiZone::Overbought) | (Direction::Down, RsiZone::Oversold)
    );
    if stretched {
        t.add(
            -p.overextended_penalty,
            format!("RSI {:.1} already {}", tech.rsi, tech.rsi_zone),
        );
    }

    if let Some(short_above) = tech.ma_bullish() {
        let ma_bias = if short_above { Direction::Up } else { Direction::Down };
        if ma_bias == bias {
            t.add(
                p.ma_trend_points,
                format!("moving averages trend {ma_bias}, with the bias"),
            );
        }
    }

    if let Some(kd) = tech.kd {
        let confirms = match bias {
            Direction::Up => kd.is_golden(),
            Direction::Down => !kd.is_golden(),
        };
        if confirms {
            t.add(
                p.kd_confirm_points,
                format!("KD {:.1}/{:.1} confirms {bias} bias", kd.k, kd.d),
            );
        }
    }
}

fn score_divergence(t: &mut Tally<'_>, divergence: &DivergenceResult, bias: Direction) {
    let favours = match divergence.kind {
        DivergenceKind::Bullish => Direction::Up,
        DivergenceKind::Bearish => Direction::Down,
        DivergenceKind::None => return,
    };
    if favours == bias {
        t.add(
            t.params.divergence_with_points,
            format!("{:?} divergence supports the bias", divergence.kind),
        );
    } else {
        t.add(
            -t.params.divergence_against_penalty,
            format!("{:?} divergence works against the bias", divergence.kind),
        );
    }
}

fn score_risk_reward(t: &mut Tally<'_>, risk_reward: Option<f64>) {
    let Some(rr) = risk_reward else {
        return;
    };
    let p = t.params;
    if rr >= p.excellent_risk_reward {
        t.add(p.excellent_risk_reward_points, format!("risk/reward {rr:.2}:1"));
    } else if rr >= p.good_risk_reward {
        t.add(p.good_risk_reward_points, format!("risk/reward {rr:.2}:1"));
    }
}

/// Wave-specific action and narrative for a long-side reader.
#[rustfmt::skip]
fn advise(wave: WaveLabel, primary: Direction) -> (Action, &'static str) {
    use WaveLabel::*;
    match (primary, wave) {
        (Direction::Up, One) => (Action::Buy, "early wave 1 of a new advance, start with a light position"),
        (Direction::Up, Two) => (Action::Buy, "wave 2 pullback, buy the dip above the wave 1 origin"),
        (Direction::Up, Three) => (Action::Add, "wave 3 in progress, hold and add on shallow dips"),
        (Direction::Up, Four) => (Action::Hold, "wave 4 consolidation, hold while it stays above wave 1"),
        (Direction::Up, Five) => (Action::ScaleOut, "wave 5 late in the advance, scale out and watch for divergence"),
        (Direction::Up, A) => (Action::Sell, "wave A decline has begun, reduce exposure"),
        (Direction::Up, B) => (Action::Sell, "wave B bounce, sell into strength and beware the bull trap"),
        (Direction::Up, C) => (Action::StayOut, "wave C decline, stay out until capitulation stops"),
        (Direction::Down, One) => (Action::Sell, "wave 1 of a new decline, exit longs"),
        (Direction::Down, Two) => (Action::Sell, "wave 2 rebound inside a downtrend, sell the bounce"),
        (Direction::Down, Three) => (Action::StayOut, "wave 3 decline, the strongest leg down, stay out"),
        (Direction::Down, Four) => (Action::StayOut, "wave 4 relief rally, not a new uptrend"),
        (Direction::Down, Five) => (Action::Hold, "wave 5 final leg down, wait for selling to exhaust"),
        (Direction::Down, A) => (Action::Buy, "wave A rebound after the decline, light position only"),
        (Direction::Down, B) => (Action::Hold, "wave B pullback, hold and watch the wave A low"),
        (Direction::Down, C) => (Action::ScaleOut, "wave C rally nearing its end, take profits"),
    }
}

fn suggestion(
    wave: WaveLabel,
    narrative: &str,
    targets: &TargetSet,
    rules: &RuleReport,
) -> String {
    let mut text = narrative.to_string();
    let fmt_level = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
    text.push_str(&format!(
        ". Wave {wave} levels: up {}, down {}, stop {}",
        fmt_level(targets.target_up),
        fmt_level(targets.target_down),
        fmt_level(targets.stop_loss)
    ));
    if let Some(rr) = targets.risk_reward {
        text.push_str(&format!(", risk/reward {rr:.2}:1"));
    }
    match rules.violations() {
        0 => {}
        1 => text.push_str(". One cardinal rule is broken, treat the count as provisional"),
        n => text.push_str(&format!(
            ". {n} cardinal rules are broken, treat the count as provisional"
        )),
    }
    text
}
