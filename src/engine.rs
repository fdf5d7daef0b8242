// =============================================================================
// Analysis Engine — one-shot, stateless entry point
// =============================================================================
//
// history + current price
//   -> technical snapshot (RSI, MACD, KD, Bollinger, MAs)
//   -> primary trend
//   -> pivots -> labelled cycle -> cardinal rules
//   -> RSI divergence
//   -> multi-view synthesis (current wave)
//   -> targets / stop / risk-reward
//   -> score, level, action
//
// Every call is independent. The engine never panics on bad input: short
// histories and malformed bars come back as tagged reports instead of errors,
// so callers can fan out over many symbols without coordination.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators::TechnicalSnapshot;
use crate::runtime_config::AnalysisParams;
use crate::types::{closes, Direction, PriceBar};
use crate::wave::rules::{GuidelineCheck, RuleCheck};
use crate::wave::{
    check_rules, detect_divergence, find_pivots, infer_primary_trend, label_waves,
    project_targets, score, synthesize, Action, ConfidenceLevel, DivergenceResult, ScoreInputs,
    SynthesisResult, TargetSet, Wave, WaveCycle, WaveLabel,
};

/// Complete analysis of one price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub current_wave: WaveLabel,
    /// Successor of `current_wave` on the ring.
    pub next_wave: WaveLabel,
    pub primary_trend: Direction,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub action: Action,
    pub suggestion_text: String,
    pub score_details: Vec<String>,
    /// Active cycle over the full history, oldest leg first.
    pub waves: WaveCycle,
    /// Legs retired from earlier cycles.
    pub wave_history: Vec<Wave>,
    pub rules: Vec<RuleCheck>,
    pub guidelines: Vec<GuidelineCheck>,
    pub divergence: DivergenceResult,
    pub targets: TargetSet,
    pub technicals: TechnicalSnapshot,
    pub multi_view: SynthesisResult,
    /// ZigZag threshold (%) used for the full-history count.
    pub threshold_pct: f64,
    pub bars_analyzed: usize,
    pub current_price: f64,
    /// Date of the last bar.
    pub as_of: NaiveDate,
}

/// Engine output, tagged by `status` when serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisReport {
    Complete(Box<AnalysisResult>),
    InsufficientData {
        required: usize,
        got: usize,
        message: String,
    },
    Rejected {
        reason: String,
    },
}

impl AnalysisReport {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Complete(r) => Some(r),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Analyse `history` (oldest first) at `current_price` with default parameters.
pub fn analyze(history: &[PriceBar], current_price: f64) -> AnalysisReport {
    analyze_with(history, current_price, &AnalysisParams::default())
}

/// Analyse `history` (oldest first) at `current_price`.
///
/// A non-finite or non-positive `current_price` falls back to the last close.
pub fn analyze_with(
    history: &[PriceBar],
    current_price: f64,
    params: &AnalysisParams,
) -> AnalysisReport {
    if history.len() < params.min_bars {
        debug!(got = history.len(), required = params.min_bars, "insufficient history");
        return AnalysisReport::InsufficientData {
            required: params.min_bars,
            got: history.len(),
            message: format!(
                "need at least {} daily bars for a wave count, got {}",
                params.min_bars,
                history.len()
            ),
        };
    }

    if let Err(reason) = validate(history) {
        warn!(reason = %reason, "rejected price history");
        return AnalysisReport::Rejected { reason };
    }

    let Some(last) = history.last() else {
        return AnalysisReport::Rejected {
            reason: "empty history".to_string(),
        };
    };
    let price = if current_price.is_finite() && current_price > 0.0 {
        current_price
    } else {
        warn!(
            current_price,
            fallback = last.close,
            "invalid current price, using last close"
        );
        last.close
    };

    let prices = closes(history);
    let primary = infer_primary_trend(&prices, params.multi_view.trend_recovery_fraction);
    let technicals = TechnicalSnapshot::compute(history, &params.indicators);

    let base_threshold = params.zigzag.base_threshold_pct;
    let scan = find_pivots(history, base_threshold, &params.zigzag);
    let labeled = label_waves(&scan.pivots, primary);
    let report = check_rules(&labeled.cycle);
    let divergence = detect_divergence(history, &params.divergence);

    let multi_view = synthesize(history, price, base_threshold, primary, &divergence, params);
    let current_wave = multi_view.wave;
    let targets = project_targets(&labeled.cycle, current_wave, price, primary);

    let advice = score(
        &ScoreInputs {
            wave: current_wave,
            primary,
            rules: &report,
            technicals: &technicals,
            targets: &targets,
            divergence: &divergence,
        },
        &params.scoring,
    );

    debug!(
        bars = history.len(),
        primary = %primary,
        pivots = scan.pivots.len(),
        legs = labeled.cycle.len(),
        wave = %current_wave,
        score = advice.score,
        action = %advice.action,
        "analysis complete"
    );

    AnalysisReport::Complete(Box::new(AnalysisResult {
        current_wave,
        next_wave: current_wave.next(),
        primary_trend: primary,
        confidence: advice.score,
        confidence_level: advice.level,
        action: advice.action,
        suggestion_text: advice.suggestion,
        score_details: advice.details,
        waves: labeled.cycle,
        wave_history: labeled.history,
        rules: report.rules,
        guidelines: report.guidelines,
        divergence,
        targets,
        technicals,
        multi_view,
        threshold_pct: scan.threshold_pct,
        bars_analyzed: history.len(),
        current_price: price,
        as_of: last.date,
    }))
}

/// Reject bars the indicators cannot work with.
fn validate(history: &[PriceBar]) -> Result<(), String> {
    for bar in history {
        if !(bar.close.is_finite() && bar.close > 0.0) {
            return Err(format!("close {} on {} is not a positive price", bar.close, bar.date));
        }
        if !(bar.high.is_finite() && bar.low.is_finite()) {
            return Err(format!("non-finite high/low on {}", bar.date));
        }
    }
    if let Some(pair) = history.windows(2).find(|w| w[1].date <= w[0].date) {
        return Err(format!(
            "bars out of chronological order: {} follows {}",
            pair[1].date, pair[0].date
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{bars_from_closes, linear, rise_then_pullback};
    use crate::wave::rules::CardinalRule;

    fn complete(report: AnalysisReport) -> AnalysisResult {
        match report {
            AnalysisReport::Complete(r) => *r,
            other => panic!("expected complete report, got {other:?}"),
        }
    }

    #[test]
    fn short_history_is_insufficient() {
        let bars = bars_from_closes(&linear(100.0, 110.0, 10));
        match analyze(&bars, 110.0) {
            AnalysisReport::InsufficientData { required, got, .. } => {
                assert_eq!(required, 30);
                assert_eq!(got, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rise_then_pullback_end_to_end() {
        let bars = bars_from_closes(&rise_then_pullback());
        let result = complete(analyze(&bars, 140.0));

        let legs: Vec<&Wave> = result.waves.iter().collect();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].label, WaveLabel::One);
        assert_eq!(legs[0].direction, Direction::Up);
        assert!((legs[0].start_price - 100.0).abs() < 1e-9);
        assert!((legs[0].end_price - 150.0).abs() < 1e-9);
        assert_eq!(legs[1].label, WaveLabel::Two);
        assert_eq!(legs[1].direction, Direction::Down);
        assert!((legs[1].end_price - 140.0).abs() < 1e-9);

        let rule1 = result
            .rules
            .iter()
            .find(|r| r.rule == CardinalRule::Wave2WithinWave1Origin)
            .unwrap();
        assert!(rule1.applicable && rule1.passed);

        assert!(matches!(result.current_wave, WaveLabel::Two | WaveLabel::Three));
        assert_eq!(result.next_wave, result.current_wave.next());
        assert_eq!(result.primary_trend, Direction::Up);
        assert!((0.0..=100.0).contains(&result.confidence));
        assert!(!result.suggestion_text.is_empty());
    }

    #[test]
    fn strictly_increasing_is_impulsive() {
        let bars = bars_from_closes(&linear(100.0, 180.0, 60));
        let result = complete(analyze(&bars, 180.0));
        assert_eq!(result.waves.len(), 1);
        assert!(matches!(result.current_wave, WaveLabel::One | WaveLabel::Three));
    }

    #[test]
    fn flat_series_degrades_to_single_leg() {
        let bars = bars_from_closes(&[100.0; 40]);
        let result = complete(analyze(&bars, 100.0));
        assert_eq!(result.waves.len(), 1);
        assert_eq!(result.current_wave, WaveLabel::One);
        assert_eq!(result.waves.last().unwrap().direction, Direction::Up);
        assert_eq!(result.targets.risk_reward, None);
        assert_eq!(result.technicals.rsi, 50.0);
        assert!(serde_json::to_string(&result).is_ok());
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let bars = bars_from_closes(&rise_then_pullback());
        let a = serde_json::to_string(&analyze(&bars, 140.0)).unwrap();
        let b = serde_json::to_string(&analyze(&bars, 140.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_order_bars_are_rejected() {
        let mut bars = bars_from_closes(&rise_then_pullback());
        bars.swap(10, 11);
        let report = analyze(&bars, 140.0);
        assert_eq!(report.status(), "rejected");
    }

    #[test]
    fn non_positive_close_is_rejected() {
        let mut closes = rise_then_pullback();
        closes[5] = 0.0;
        let report = analyze(&bars_from_closes(&closes), 140.0);
        assert!(matches!(report, AnalysisReport::Rejected { .. }));
    }

    #[test]
    fn invalid_current_price_uses_last_close() {
        let bars = bars_from_closes(&rise_then_pullback());
        let result = complete(analyze(&bars, f64::NAN));
        assert!((result.current_price - 140.0).abs() < 1e-9);
    }

    #[test]
    fn report_serialises_with_status_tag() {
        let bars = bars_from_closes(&rise_then_pullback());
        let value = serde_json::to_value(analyze(&bars, 140.0)).unwrap();
        assert_eq!(value["status"], "complete");
        assert_eq!(value["waves"][0]["label"], "1");

        let short = serde_json::to_value(analyze(&bars[..5], 140.0)).unwrap();
        assert_eq!(short["status"], "insufficient_data");
        assert_eq!(short["got"], 5);
    }
}
