pub mod history_store;

// Re-export for convenient access (e.g. `use crate::market_data::HistoryStore`).
pub use history_store::{normalize_symbol, parse_history_json, HistoryStore};
