// =============================================================================
// Wave Engine — Elliott Wave analysis over daily price histories
// =============================================================================
//
// The library holds the stateless engine (`engine::analyze`) and the service
// plumbing the binary wraps around it.
// =============================================================================

pub mod analysis_record;
pub mod api;
pub mod app_state;
pub mod engine;
pub mod indicators;
pub mod market_data;
pub mod runtime_config;
pub mod types;
pub mod wave;

pub use engine::{analyze, analyze_with, AnalysisReport, AnalysisResult};
pub use runtime_config::{AnalysisParams, RuntimeConfig};
pub use types::PriceBar;
