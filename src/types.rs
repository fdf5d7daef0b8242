// =============================================================================
// Shared types used across the wave analysis engine
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily OHLCV bar. Histories are ordered oldest-first and owned by
/// the caller; the engine only ever borrows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    /// Build a bar whose open/high/low all equal `close`. Handy for close-only
    /// feeds and for tests.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

/// Extract closing prices (oldest-first).
pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Price direction of a move or of the primary trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// +1.0 for up, -1.0 for down.
    pub fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }

    /// Direction of the move from `from` to `to`. A flat move counts as up.
    pub fn of_move(from: f64, to: f64) -> Self {
        if to < from {
            Self::Down
        } else {
            Self::Up
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Up
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Percentage change from `from` to `to`. Returns 0.0 when `from` is not a
/// positive finite number.
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 && from.is_finite() && to.is_finite() {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}
