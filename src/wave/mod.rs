// =============================================================================
// Elliott Wave Module
// =============================================================================
//
// Pipeline, leaf first:
//
//   pivot       dynamic ZigZag over closes
//   labeler     pivots -> labelled legs on the 8-phase ring
//   rules       cardinal rules + guidelines over the active cycle
//   divergence  price vs RSI extremes
//   synthesis   three windowed counts reconciled into one verdict
//   targets     Fibonacci levels, stop, risk/reward
//   scoring     0-100 score, level, action, narrative

pub mod divergence;
pub mod label;
pub mod labeler;
pub mod pivot;
pub mod rules;
pub mod scoring;
pub mod synthesis;
pub mod targets;

pub use divergence::{detect_divergence, DivergenceKind, DivergenceResult};
pub use label::{WaveKind, WaveLabel};
pub use labeler::{infer_primary_trend, label_waves, Wave, WaveCycle};
pub use pivot::{find_pivots, Pivot, PivotKind};
pub use rules::{check_rules, RuleReport};
pub use scoring::{score, Action, Advice, ConfidenceLevel, ScoreInputs};
pub use synthesis::{synthesize, Consensus, SynthesisResult};
pub use targets::{project_targets, TargetSet};
