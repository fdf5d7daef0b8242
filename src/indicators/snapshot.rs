// =============================================================================
// Technical Snapshot
// =============================================================================
//
// Latest value of every oscillator the scorer and the report read, computed
// once per analysis from the full history.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::bollinger::{calculate_bollinger, BollingerResult};
use super::ema::sma;
use super::macd::{calculate_macd, MacdResult};
use super::rsi::{rsi, rsi_zone, RsiZone};
use super::stochastic::{calculate_kd, KdResult};
use crate::runtime_config::IndicatorParams;
use crate::types::{closes, PriceBar};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub rsi: f64,
    pub rsi_zone: RsiZone,
    pub macd: MacdResult,
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub kd: Option<KdResult>,
    pub bollinger: Option<BollingerResult>,
    /// Position of the last close inside the Bollinger bands (0 = lower, 1 = upper).
    pub bollinger_percent_b: Option<f64>,
}

impl TechnicalSnapshot {
    pub fn compute(bars: &[PriceBar], params: &IndicatorParams) -> Self {
        let prices = closes(bars);
        let rsi_value = rsi(&prices, params.rsi_period);
        let bollinger = calculate_bollinger(&prices, params.bollinger_period, params.bollinger_std);
        let last = prices.last().copied();

        Self {
            rsi: rsi_value,
            rsi_zone: rsi_zone(rsi_value),
            macd: calculate_macd(&prices, params.macd_fast, params.macd_slow, params.macd_signal),
            short_ma: sma(&prices, params.short_ma),
            long_ma: sma(&prices, params.long_ma),
            kd: calculate_kd(bars, params.kd_period),
            bollinger_percent_b: bollinger.zip(last).map(|(bb, price)| bb.percent_b(price)),
            bollinger,
        }
    }

    /// Short average above the long one. `None` until both exist.
    pub fn ma_bullish(&self) -> Option<bool> {
        Some(self.short_ma? > self.long_ma?)
    }
}
