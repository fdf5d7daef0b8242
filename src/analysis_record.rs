// =============================================================================
// Analysis Record — audit entry for every analysis served
// =============================================================================
//
// The full report is returned to the caller and not retained. The record keeps
// just enough to reconstruct what was said, for whom, and when.
// =============================================================================

use serde::Serialize;

use crate::engine::AnalysisReport;
use crate::wave::{Action, WaveLabel};

/// Compact audit record of one served analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    /// Unique identifier for this record (UUID v4).
    pub id: String,

    pub symbol: String,

    /// Report status: "complete", "insufficient_data" or "rejected".
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave: Option<WaveLabel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Price the analysis was evaluated at (absent when not complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// ISO 8601 timestamp of when this record was created.
    pub created_at: String,
}

impl AnalysisRecord {
    pub fn from_report(symbol: impl Into<String>, report: &AnalysisReport) -> Self {
        let result = report.result();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            status: report.status().to_string(),
            wave: result.map(|r| r.current_wave),
            action: result.map(|r| r.action),
            confidence: result.map(|r| r.confidence),
            price: result.map(|r| r.current_price),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analyze;
    use crate::types::test_support::{bars_from_closes, rise_then_pullback};

    #[test]
    fn complete_report_fills_summary() {
        let bars = bars_from_closes(&rise_then_pullback());
        let report = analyze(&bars, 140.0);
        let record = AnalysisRecord::from_report("AAPL", &report);

        assert_eq!(record.status, "complete");
        assert!(record.wave.is_some());
        assert!(record.action.is_some());
        assert_eq!(record.price, Some(140.0));
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&record.created_at).is_ok());
    }

    #[test]
    fn short_report_has_no_verdict() {
        let bars = bars_from_closes(&[100.0; 5]);
        let record = AnalysisRecord::from_report("X", &analyze(&bars, 100.0));
        assert_eq!(record.status, "insufficient_data");
        assert!(record.wave.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("wave").is_none());
        assert!(json.get("confidence").is_none());
    }
}
