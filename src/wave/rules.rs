// =============================================================================
// Rule Validator
// =============================================================================
//
// Three cardinal rules an impulse count must never break:
//
//   1. Wave 2 never retraces past the origin of wave 1.
//   2. Wave 3 is never the shortest of waves 1, 3 and 5 (by % change).
//   3. Wave 4 never ends inside wave 1's price territory.
//
// A rule whose legs are not in the cycle yet passes vacuously and is marked
// `applicable: false`. A partial count is not evidence of a broken one, and
// the scorer ignores inapplicable checks.
//
// Guidelines are softer: they add confidence when satisfied but never
// invalidate the count.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::label::WaveLabel;
use super::labeler::{Wave, WaveCycle};

/// Retracement of the prior leg at or beyond which a correction is "sharp".
const SHARP_RETRACE: f64 = 0.5;
const WAVE3_EXTENSION: f64 = 1.618;
const WAVE2_RETRACE_MIN: f64 = 0.382;
const WAVE2_RETRACE_MAX: f64 = 0.786;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalRule {
    Wave2WithinWave1Origin,
    Wave3NotShortest,
    Wave4NoOverlap,
}

impl CardinalRule {
    pub fn name(self) -> &'static str {
        match self {
            Self::Wave2WithinWave1Origin => "Wave 2 never retraces beyond the start of wave 1",
            Self::Wave3NotShortest => "Wave 3 is never the shortest impulse wave",
            Self::Wave4NoOverlap => "Wave 4 never enters wave 1 territory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheck {
    pub rule: CardinalRule,
    pub name: String,
    pub passed: bool,
    /// False when the legs the rule needs are not in the cycle.
    pub applicable: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineCheck {
    pub name: String,
    pub satisfied: bool,
    pub applicable: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleReport {
    pub rules: Vec<RuleCheck>,
    pub guidelines: Vec<GuidelineCheck>,
}

impl RuleReport {
    /// Applicable rules that held.
    pub fn confirmed(&self) -> usize {
        self.rules.iter().filter(|r| r.applicable && r.passed).count()
    }

    pub fn violations(&self) -> usize {
        self.rules.iter().filter(|r| r.applicable && !r.passed).count()
    }

    pub fn guidelines_met(&self) -> usize {
        self.guidelines.iter().filter(|g| g.applicable && g.satisfied).count()
    }
}

fn rule(rule: CardinalRule, passed: bool, applicable: bool, detail: String) -> RuleCheck {
    RuleCheck {
        rule,
        name: rule.name().to_string(),
        passed,
        applicable,
        detail,
    }
}

fn guideline(name: &str, satisfied: bool, applicable: bool, detail: String) -> GuidelineCheck {
    GuidelineCheck {
        name: name.to_string(),
        satisfied: applicable && satisfied,
        applicable,
        detail,
    }
}

fn not_yet(what: &str) -> String {
    format!("{what} not formed yet, rule holds vacuously")
}

/// Check the cardinal rules and guidelines against the active cycle.
pub fn check_rules(cycle: &WaveCycle) -> RuleReport {
    let w1 = cycle.get(WaveLabel::One);
    let w2 = cycle.get(WaveLabel::Two);
    let w3 = cycle.get(WaveLabel::Three);
    let w4 = cycle.get(WaveLabel::Four);
    let w5 = cycle.get(WaveLabel::Five);

    RuleReport {
        rules: vec![rule_one(w1, w2), rule_two(w1, w3, w5), rule_three(w1, w4)],
        guidelines: vec![
            alternation(w1, w2, w3, w4),
            wave3_extension(w1, w3),
            wave2_retracement(w1, w2),
        ],
    }
}

fn rule_one(w1: Option<&Wave>, w2: Option<&Wave>) -> RuleCheck {
    let kind = CardinalRule::Wave2WithinWave1Origin;
    let (Some(w1), Some(w2)) = (w1, w2) else {
        return rule(kind, true, false, not_yet("Wave 2"));
    };
    let s = w1.direction.sign();
    let passed = s * (w2.end_price - w1.start_price) >= 0.0;
    rule(
        kind,
        passed,
        true,
        format!("W1 start {:.2}, W2 end {:.2}", w1.start_price, w2.end_price),
    )
}

fn rule_two(w1: Option<&Wave>, w3: Option<&Wave>, w5: Option<&Wave>) -> RuleCheck {
    let kind = CardinalRule::Wave3NotShortest;
    let (Some(w1), Some(w3), Some(w5)) = (w1, w3, w5) else {
        return rule(kind, true, false, not_yet("Wave 5"));
    };
    let (m1, m3, m5) = (
        w1.change_pct.abs(),
        w3.change_pct.abs(),
        w5.change_pct.abs(),
    );
    let passed = !(m3 < m1 && m3 < m5);
    rule(
        kind,
        passed,
        true,
        format!("W1 {m1:.1}%, W3 {m3:.1}%, W5 {m5:.1}%"),
    )
}

fn rule_three(w1: Option<&Wave>, w4: Option<&Wave>) -> RuleCheck {
    let kind = CardinalRule::Wave4NoOverlap;
    let (Some(w1), Some(w4)) = (w1, w4) else {
        return rule(kind, true, false, not_yet("Wave 4"));
    };
    let s = w1.direction.sign();
    let passed = s * (w4.end_price - w1.end_price) > 0.0;
    rule(
        kind,
        passed,
        true,
        format!("W1 end {:.2}, W4 end {:.2}", w1.end_price, w4.end_price),
    )
}

fn alternation(
    w1: Option<&Wave>,
    w2: Option<&Wave>,
    w3: Option<&Wave>,
    w4: Option<&Wave>,
) -> GuidelineCheck {
    const NAME: &str = "Alternation between waves 2 and 4";
    let (Some(w1), Some(w2), Some(w3), Some(w4)) = (w1, w2, w3, w4) else {
        return guideline(NAME, false, false, "needs waves 1-4".into());
    };
    let r2 = w2.ratio_to(w1);
    let r4 = w4.ratio_to(w3);
    let sharp = |r: f64| if r >= SHARP_RETRACE { "sharp" } else { "flat" };
    guideline(
        NAME,
        (r2 >= SHARP_RETRACE) != (r4 >= SHARP_RETRACE),
        true,
        format!(
            "W2 retrace {:.1}% ({}), W4 retrace {:.1}% ({})",
            r2 * 100.0,
            sharp(r2),
            r4 * 100.0,
            sharp(r4)
        ),
    )
}

fn wave3_extension(w1: Option<&Wave>, w3: Option<&Wave>) -> GuidelineCheck {
    const NAME: &str = "Wave 3 extends at least 1.618x wave 1";
    let (Some(w1), Some(w3)) = (w1, w3) else {
        return guideline(NAME, false, false, "needs waves 1 and 3".into());
    };
    let ratio = w3.ratio_to(w1);
    guideline(
        NAME,
        ratio >= WAVE3_EXTENSION,
        true,
        format!("W3 / W1 = {ratio:.3}"),
    )
}

fn wave2_retracement(w1: Option<&Wave>, w2: Option<&Wave>) -> GuidelineCheck {
    const NAME: &str = "Wave 2 retraces 38.2%-78.6% of wave 1";
    let (Some(w1), Some(w2)) = (w1, w2) else {
        return guideline(NAME, false, false, "needs waves 1 and 2".into());
    };
    let ratio = w2.ratio_to(w1);
    guideline(
        NAME,
        (WAVE2_RETRACE_MIN..=WAVE2_RETRACE_MAX).contains(&ratio),
        true,
        format!("W2 retrace {:.1}%", ratio * 100.0),
    )
}
