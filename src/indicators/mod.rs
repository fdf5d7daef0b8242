// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the oscillators and averages the
// wave engine reads. Short input never errors: callers get either `None` or a
// documented neutral default (RSI 50, MACD all-zero).

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod snapshot;
pub mod stochastic;

pub use bollinger::BollingerResult;
pub use macd::MacdResult;
pub use rsi::RsiZone;
pub use snapshot::TechnicalSnapshot;
pub use stochastic::KdResult;
