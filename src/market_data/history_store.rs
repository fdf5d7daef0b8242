use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::types::PriceBar;

// ---------------------------------------------------------------------------
// HistoryStore -- thread-safe daily bar buffer per symbol
// ---------------------------------------------------------------------------

/// Thread-safe buffer holding the most recent daily bars per symbol, oldest
/// first, at most one bar per date. Writers upsert by date; the ring is
/// trimmed to `max_bars` from the front.
pub struct HistoryStore {
    buffers: RwLock<HashMap<String, VecDeque<PriceBar>>>,
    max_bars: usize,
}

/// Canonical form of a ticker symbol used as the store key.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl HistoryStore {
    /// Create a store that retains at most `max_bars` bars per symbol.
    pub fn new(max_bars: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_bars: max_bars.max(1),
        }
    }

    /// Insert a bar, replacing any existing bar with the same date.
    ///
    /// Appending the next session is the common case; back-filled dates are
    /// inserted in order.
    pub fn upsert(&self, symbol: &str, bar: PriceBar) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(normalize_symbol(symbol))
            .or_insert_with(|| VecDeque::with_capacity(self.max_bars));

        match ring.back() {
            Some(last) if last.date < bar.date => ring.push_back(bar),
            None => ring.push_back(bar),
            _ => match ring.binary_search_by(|b| b.date.cmp(&bar.date)) {
                Ok(i) => ring[i] = bar,
                Err(i) => ring.insert(i, bar),
            },
        }

        while ring.len() > self.max_bars {
            ring.pop_front();
        }
    }

    /// Replace a symbol's history wholesale. Bars are sorted by date and
    /// duplicate dates collapse to the last one given. Returns the number of
    /// bars kept.
    pub fn replace(&self, symbol: &str, mut bars: Vec<PriceBar>) -> usize {
        // Stable sort keeps the input order among equal dates.
        bars.sort_by(|a, b| a.date.cmp(&b.date));
        let mut ring: VecDeque<PriceBar> = VecDeque::with_capacity(bars.len().min(self.max_bars));
        for bar in bars {
            match ring.back_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => ring.push_back(bar),
            }
        }
        while ring.len() > self.max_bars {
            ring.pop_front();
        }

        let kept = ring.len();
        let key = normalize_symbol(symbol);
        debug!(symbol = %key, bars = kept, "history replaced");
        self.buffers.write().insert(key, ring);
        kept
    }

    /// The most recent `count` bars (oldest first).
    pub fn get(&self, symbol: &str, count: usize) -> Vec<PriceBar> {
        let map = self.buffers.read();
        match map.get(&normalize_symbol(symbol)) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Close of the most recent bar, if any.
    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        let map = self.buffers.read();
        map.get(&normalize_symbol(symbol))
            .and_then(|ring| ring.back().map(|b| b.close))
    }

    pub fn count(&self, symbol: &str) -> usize {
        let map = self.buffers.read();
        map.get(&normalize_symbol(symbol)).map_or(0, VecDeque::len)
    }

    /// All stored symbols with their bar counts, sorted by symbol.
    pub fn symbols(&self) -> Vec<(String, usize)> {
        let map = self.buffers.read();
        let mut out: Vec<(String, usize)> = map.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        out.sort();
        out
    }

    /// Load every `<SYMBOL>.json` file in `dir` (a JSON array of bars).
    ///
    /// A missing directory is not an error. Files that fail to parse are
    /// skipped with a warning. Returns the number of symbols loaded.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            warn!(dir = %dir.display(), "history directory does not exist, starting empty");
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read history directory {}", dir.display()))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", dir.display()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str());
            let Some(symbol) = stem.map(normalize_symbol) else {
                continue;
            };

            match load_history_file(&path) {
                Ok(bars) => {
                    let kept = self.replace(&symbol, bars);
                    info!(symbol = %symbol, bars = kept, "history loaded");
                    loaded += 1;
                }
                Err(e) => warn!(file = %path.display(), error = %e, "skipping history file"),
            }
        }
        Ok(loaded)
    }
}

/// Parse a JSON array of bars from `path`.
fn load_history_file(path: &Path) -> Result<Vec<PriceBar>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_history_json(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parse a JSON array of daily bars.
pub fn parse_history_json(text: &str) -> Result<Vec<PriceBar>> {
    serde_json::from_str(text)
        .context("expected a JSON array of {date, open, high, low, close, volume}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
