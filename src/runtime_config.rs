// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the wave engine. Every tunable the analysis
// reads lives here: indicator periods, the ZigZag volatility tiers, the
// divergence tolerances, the multi-view windows and the scoring increments.
// Several of these are empirically chosen; they stay configurable rather than
// hard-coded.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry serde defaults so that adding new fields never
// breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_bars_per_symbol() -> usize {
    600
}

// =============================================================================
// ServerSettings
// =============================================================================

/// Settings for the HTTP service wrapped around the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Socket address the API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory scanned at startup for `<SYMBOL>.json` bar files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Bars retained per symbol in the history store.
    #[serde(default = "default_max_bars_per_symbol")]
    pub max_bars_per_symbol: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            max_bars_per_symbol: default_max_bars_per_symbol(),
        }
    }
}

// =============================================================================
// IndicatorParams
// =============================================================================

/// Periods for the oscillators in the technical snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub kd_period: usize,
    pub short_ma: usize,
    pub long_ma: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std: 2.0,
            kd_period: 9,
            short_ma: 20,
            long_ma: 60,
        }
    }
}

// =============================================================================
// ZigzagParams
// =============================================================================

/// Hard ceiling on ZigZag retries, whatever the config asks for.
pub const MAX_ZIGZAG_RETRIES: usize = 10;

/// A volatility tier: series whose total range exceeds `min_range_pct` use at
/// least `threshold_pct` as their reversal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTier {
    pub min_range_pct: f64,
    pub threshold_pct: f64,
}

/// Dynamic ZigZag tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZigzagParams {
    /// Reversal threshold for quiet series (total range below every tier).
    pub base_threshold_pct: f64,

    /// Volatility tiers, in any order.
    pub tiers: Vec<ThresholdTier>,

    /// Fewer pivots than this triggers a retry with a smaller threshold.
    pub min_pivots: usize,

    /// Multiplier applied to the threshold on each retry.
    pub retry_factor: f64,

    /// Upper bound on retries, itself capped at [`MAX_ZIGZAG_RETRIES`].
    pub max_retries: usize,

    /// Retries stop before the threshold would drop below this.
    pub min_threshold_pct: f64,

    /// ATR look-back used for the noise floor.
    pub atr_period: usize,

    /// The threshold never goes below `atr_pct * atr_multiplier`...
    pub atr_multiplier: f64,

    /// ...with that floor itself capped here.
    pub atr_floor_cap_pct: f64,

    /// The unconfirmed tail leg is reported once it has retraced at least
    /// this fraction of the active threshold.
    pub tail_fraction: f64,
}

impl Default for ZigzagParams {
    fn default() -> Self {
        Self {
            base_threshold_pct: 5.0,
            tiers: vec![
                ThresholdTier { min_range_pct: 200.0, threshold_pct: 12.0 },
                ThresholdTier { min_range_pct: 100.0, threshold_pct: 10.0 },
                ThresholdTier { min_range_pct: 60.0, threshold_pct: 8.0 },
                ThresholdTier { min_range_pct: 30.0, threshold_pct: 6.0 },
            ],
            min_pivots: 4,
            retry_factor: 0.6,
            max_retries: 3,
            min_threshold_pct: 1.5,
            atr_period: 14,
            atr_multiplier: 1.5,
            atr_floor_cap_pct: 8.0,
            tail_fraction: 0.5,
        }
    }
}

impl ZigzagParams {
    /// Threshold for a series with total range `range_pct`, never below
    /// `base_pct`. Non-decreasing in `range_pct` whatever the tier order.
    pub fn threshold_for_range(&self, range_pct: f64, base_pct: f64) -> f64 {
        self.tiers
            .iter()
            .filter(|t| range_pct > t.min_range_pct)
            .map(|t| t.threshold_pct)
            .fold(base_pct, f64::max)
    }
}

// =============================================================================
// DivergenceParams
// =============================================================================

/// RSI/price divergence tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceParams {
    pub lookback: usize,
    pub rsi_period: usize,
    /// Recent extreme must be within this % of the window extreme.
    pub near_extreme_pct: f64,
    /// RSI must differ from its prior extreme by at least this % (relative).
    pub min_rsi_gap_pct: f64,
    /// Prior RSI extreme must be at least this many bars before the recent one.
    pub min_peak_separation: usize,
}

impl Default for DivergenceParams {
    fn default() -> Self {
        Self {
            lookback: 30,
            rsi_period: 14,
            near_extreme_pct: 2.0,
            min_rsi_gap_pct: 5.0,
            min_peak_separation: 3,
        }
    }
}

// =============================================================================
// MultiViewParams
// =============================================================================

/// Windows, consensus confidences and nudges for the multi-view synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiViewParams {
    /// Trading days in the short (~6 months), mid (~9) and long (~12) views.
    pub short_window: usize,
    pub mid_window: usize,
    pub long_window: usize,

    /// Base-threshold multipliers per view.
    pub short_threshold_scale: f64,
    pub mid_threshold_scale: f64,
    pub long_threshold_scale: f64,

    pub strong_consensus_confidence: f64,
    pub moderate_consensus_confidence: f64,
    pub weak_consensus_confidence: f64,

    /// A corrective view whose price is back within this % of the window
    /// extreme is treated as finished.
    pub correction_done_pct: f64,

    /// A single-leg view that has run this far (%) reads as a third wave.
    pub extended_run_pct: f64,

    /// Pullback (%) beyond which an assumed wave 3 becomes wave 4.
    pub deep_pullback_pct: f64,

    pub divergence_penalty: f64,

    /// Weekly pivots required before wave 4 / wave 5 conclusions stand.
    pub weekly_min_pivots_wave4: usize,
    pub weekly_min_pivots_wave5: usize,
    pub weekly_penalty: f64,

    /// Share of the move between the window's extreme closes that price must
    /// give back before the primary trend is read the other way.
    pub trend_recovery_fraction: f64,
}

impl Default for MultiViewParams {
    fn default() -> Self {
        Self {
            short_window: 126,
            mid_window: 189,
            long_window: 252,
            short_threshold_scale: 0.7,
            mid_threshold_scale: 0.85,
            long_threshold_scale: 1.0,
            strong_consensus_confidence: 85.0,
            moderate_consensus_confidence: 70.0,
            weak_consensus_confidence: 55.0,
            correction_done_pct: 3.0,
            extended_run_pct: 100.0,
            deep_pullback_pct: 25.0,
            divergence_penalty: 5.0,
            weekly_min_pivots_wave4: 3,
            weekly_min_pivots_wave5: 4,
            weekly_penalty: 5.0,
            trend_recovery_fraction: 0.5,
        }
    }
}

// =============================================================================
// ScoringParams
// =============================================================================

/// Increments used by the confidence scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub base_score: f64,
    pub rule_pass_points: f64,
    pub rule_fail_penalty: f64,
    pub guideline_points: f64,
    pub momentum_confirm_points: f64,
    pub overextended_penalty: f64,
    pub kd_confirm_points: f64,
    pub ma_trend_points: f64,
    pub divergence_against_penalty: f64,
    pub divergence_with_points: f64,
    pub good_risk_reward: f64,
    pub good_risk_reward_points: f64,
    pub excellent_risk_reward: f64,
    pub excellent_risk_reward_points: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            base_score: 50.0,
            rule_pass_points: 10.0,
            rule_fail_penalty: 15.0,
            guideline_points: 5.0,
            momentum_confirm_points: 5.0,
            overextended_penalty: 5.0,
            kd_confirm_points: 3.0,
            ma_trend_points: 3.0,
            divergence_against_penalty: 10.0,
            divergence_with_points: 5.0,
            good_risk_reward: 2.0,
            good_risk_reward_points: 5.0,
            excellent_risk_reward: 3.0,
            excellent_risk_reward_points: 10.0,
        }
    }
}

// =============================================================================
// AnalysisParams
// =============================================================================

/// Everything the engine reads. Cloned per call so a concurrent config update
/// never leaks into an analysis in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Histories shorter than this return an insufficient-data report.
    pub min_bars: usize,
    pub indicators: IndicatorParams,
    pub zigzag: ZigzagParams,
    pub divergence: DivergenceParams,
    pub multi_view: MultiViewParams,
    pub scoring: ScoringParams,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            min_bars: 30,
            indicators: IndicatorParams::default(),
            zigzag: ZigzagParams::default(),
            divergence: DivergenceParams::default(),
            multi_view: MultiViewParams::default(),
            scoring: ScoringParams::default(),
        }
    }
}

impl AnalysisParams {
    /// Reject parameter sets the indicator kernels cannot run with.
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        anyhow::ensure!(self.min_bars >= 2, "min_bars must be at least 2");
        anyhow::ensure!(
            [
                ind.rsi_period,
                ind.macd_fast,
                ind.macd_slow,
                ind.macd_signal,
                ind.bollinger_period,
                ind.kd_period,
                ind.short_ma,
                ind.long_ma,
            ]
            .iter()
            .all(|&p| p > 0),
            "indicator periods must be positive"
        );
        anyhow::ensure!(ind.macd_fast < ind.macd_slow, "macd_fast must be below macd_slow");

        let zz = &self.zigzag;
        anyhow::ensure!(
            zz.base_threshold_pct.is_finite() && zz.base_threshold_pct > 0.0,
            "base_threshold_pct must be positive"
        );
        anyhow::ensure!(
            zz.retry_factor > 0.0 && zz.retry_factor < 1.0,
            "retry_factor must be in (0, 1)"
        );
        anyhow::ensure!(
            zz.max_retries <= MAX_ZIGZAG_RETRIES,
            "max_retries must be at most {MAX_ZIGZAG_RETRIES}"
        );
        anyhow::ensure!(
            zz.min_threshold_pct.is_finite() && zz.min_threshold_pct > 0.0,
            "min_threshold_pct must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&zz.tail_fraction),
            "tail_fraction must be in [0, 1]"
        );
        anyhow::ensure!(zz.atr_period > 0, "atr_period must be positive");
        anyhow::ensure!(
            self.divergence.lookback > 0 && self.divergence.rsi_period > 0,
            "divergence lookback and rsi_period must be positive"
        );

        let mv = &self.multi_view;
        anyhow::ensure!(
            mv.short_window > 0 && mv.mid_window > 0 && mv.long_window > 0,
            "multi-view windows must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&mv.trend_recovery_fraction),
            "trend_recovery_fraction must be in [0, 1]"
        );
        Ok(())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub analysis: AnalysisParams,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.server.bind_addr,
            min_bars = config.analysis.min_bars,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
