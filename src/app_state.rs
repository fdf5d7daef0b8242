// =============================================================================
// Central Application State — Wave Engine Service
// =============================================================================
//
// Shared by every HTTP handler via `Arc<AppState>`. The engine itself is
// stateless; what lives here is the bar history it reads, the parameters it
// runs with, and the audit trail of what it said.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the config and the audit trail.
//   - HistoryStore manages its own interior mutability.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::analysis_record::AnalysisRecord;
use crate::engine::{analyze_with, AnalysisReport};
use crate::market_data::{normalize_symbol, HistoryStore};
use crate::runtime_config::{AnalysisParams, RuntimeConfig};

/// Maximum number of analysis records to retain.
const MAX_RECENT_ANALYSES: usize = 100;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter. Bumped on every history,
    /// config or audit mutation.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    /// Where config updates are persisted. `None` keeps updates in memory.
    pub config_path: Option<PathBuf>,
    /// Bearer token required by mutating endpoints. `None` rejects them all.
    pub admin_token: Option<String>,

    // ── Market Data ─────────────────────────────────────────────────────
    pub store: Arc<HistoryStore>,

    // ── Analysis Audit Trail ────────────────────────────────────────────
    pub recent_analyses: RwLock<Vec<AnalysisRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, config_path: Option<PathBuf>) -> Self {
        let store = Arc::new(HistoryStore::new(config.server.max_bars_per_symbol));
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            config_path,
            admin_token: None,
            store,
            recent_analyses: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Set the admin token; blank tokens count as unset.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Snapshot of the current analysis parameters.
    pub fn analysis_params(&self) -> AnalysisParams {
        self.runtime_config.read().analysis.clone()
    }

    /// Validate and install new analysis parameters, persisting them when a
    /// config path is set. On error nothing changes.
    pub fn update_analysis_params(&self, params: AnalysisParams) -> Result<()> {
        params.validate().context("invalid analysis parameters")?;

        // Held across the save so memory and disk agree on the last writer.
        let mut config = self.runtime_config.write();
        let mut updated = config.clone();
        updated.analysis = params;
        if let Some(path) = &self.config_path {
            updated.save(path)?;
        }
        *config = updated;
        drop(config);

        let version = self.increment_version();
        info!(version, "analysis parameters updated");
        Ok(())
    }

    // ── Analysis ────────────────────────────────────────────────────────

    /// Run the engine for `symbol` over its stored history and record the
    /// outcome. `price` defaults to the last stored close. Returns `None`
    /// when the symbol has no history at all.
    ///
    /// CPU-bound; async callers should run it on the blocking pool.
    pub fn run_analysis(&self, symbol: &str, price: Option<f64>) -> Option<AnalysisReport> {
        let symbol = normalize_symbol(symbol);
        let bars = self.store.get(&symbol, usize::MAX);
        let last_close = bars.last()?.close;

        let params = self.analysis_params();
        let report = analyze_with(&bars, price.unwrap_or(last_close), &params);
        debug!(symbol = %symbol, status = report.status(), "analysis served");

        self.push_analysis(AnalysisRecord::from_report(symbol, &report));
        Some(report)
    }

    // ── Analysis Audit ──────────────────────────────────────────────────

    /// Record an analysis. The buffer is capped at [`MAX_RECENT_ANALYSES`];
    /// oldest entries are evicted when the limit is reached.
    pub fn push_analysis(&self, record: AnalysisRecord) {
        let mut records = self.recent_analyses.write();
        records.push(record);
        while records.len() > MAX_RECENT_ANALYSES {
            records.remove(0);
        }
        drop(records);

        self.increment_version();
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{bars_from_closes, rise_then_pullback};

    fn state_with_history() -> AppState {
        let state = AppState::new(RuntimeConfig::default(), None);
        state.store.replace("AAPL", bars_from_closes(&rise_then_pullback()));
        state
    }

    #[test]
    fn unknown_symbol_has_no_report() {
        let state = AppState::new(RuntimeConfig::default(), None);
        assert!(state.run_analysis("NOPE", None).is_none());
        assert!(state.recent_analyses.read().is_empty());
    }

    #[test]
    fn analysis_defaults_to_last_close_and_is_recorded() {
        let state = state_with_history();
        let report = state.run_analysis("aapl", None).unwrap();
        let result = report.result().unwrap();
        assert!((result.current_price - 140.0).abs() < 1e-9);

        let records = state.recent_analyses.read();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "AAPL");
        assert_eq!(records[0].status, "complete");
    }

    #[test]
    fn audit_trail_is_capped() {
        let state = state_with_history();
        let report = state.run_analysis("AAPL", Some(141.0)).unwrap();
        for _ in 0..(MAX_RECENT_ANALYSES + 5) {
            state.push_analysis(AnalysisRecord::from_report("AAPL", &report));
        }
        assert_eq!(state.recent_analyses.read().len(), MAX_RECENT_ANALYSES);
    }

    #[test]
    fn invalid_params_are_not_installed() {
        let state = AppState::new(RuntimeConfig::default(), None);
        let before = state.current_state_version();

        let mut bad = AnalysisParams::default();
        bad.multi_view.short_window = 0;
        assert!(state.update_analysis_params(bad).is_err());
        assert_eq!(state.analysis_params(), AnalysisParams::default());
        assert_eq!(state.current_state_version(), before);

        let mut good = AnalysisParams::default();
        good.min_bars = 40;
        state.update_analysis_params(good).unwrap();
        assert_eq!(state.analysis_params().min_bars, 40);
        assert!(state.current_state_version() > before);
    }

    #[test]
    fn params_update_is_persisted() {
        let dir = std::env::temp_dir().join(format!("wave-state-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wave_config.json");

        let state = AppState::new(RuntimeConfig::default(), Some(path.clone()));
        let mut params = AnalysisParams::default();
        params.zigzag.base_threshold_pct = 4.0;
        state.update_analysis_params(params).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert!((loaded.analysis.zigzag.base_threshold_pct - 4.0).abs() < f64::EPSILON);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn concurrent_updates_leave_memory_and_disk_in_agreement() {
        let dir = std::env::temp_dir().join(format!("wave-state-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wave_config.json");
        let state = Arc::new(AppState::new(RuntimeConfig::default(), Some(path.clone())));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        let mut params = AnalysisParams::default();
                        params.min_bars = 30 + i * 10 + j;
                        state.update_analysis_params(params).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let on_disk = RuntimeConfig::load(&path).unwrap();
        assert_eq!(on_disk.analysis.min_bars, state.analysis_params().min_bars);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
