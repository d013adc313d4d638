//! Strategy layer: pricing, sizing, safety checks and daily risk limits.
//!
//! Everything here is synchronous and free of I/O; the engine feeds it
//! snapshots and acts on what it returns.

pub mod kelly;
pub mod pricing;
pub mod risk;
pub mod safety;

use serde::Deserialize;

/// Quoting parameters shared by the phase handlers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Spread below fair value for neutral bids.
    pub target_margin: f64,
    /// Minimum locked profit per pair when pricing the hedge.
    pub min_profit: f64,
    /// Bid reduction per share already held.
    pub risk_factor: f64,
    /// Notional (USD) per leg.
    pub position_size: f64,
    /// Annualised volatility for the Black-Scholes model.
    pub volatility: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            target_margin: 0.02,
            min_profit: 0.01,
            risk_factor: 0.01,
            position_size: 50.0,
            volatility: 0.60,
        }
    }
}

/// Shares bought with `notional` at `price`.
pub fn shares_at(notional: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    notional / price
}
