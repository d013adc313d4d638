//! Kelly criterion position sizing.
//!
//! Fractional Kelly for binary payoffs. Not on the default quoting path
//! (legs are sized from the configured notional) but available to callers
//! that want bankroll-relative sizing.

use serde::Deserialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fraction of full Kelly to bet (0.1 = tenth-Kelly).
    pub fraction: f64,
    /// Net odds paid per unit staked (1.0 for an even binary).
    pub odds: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction: 0.1,
            odds: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly formula
// ---------------------------------------------------------------------------

/// Raw Kelly fraction f* = (b·p - q) / b.
///
/// Zero for certainty or impossibility (p outside (0, 1)) and for
/// non-positive odds.
pub fn kelly_fraction(probability: f64, odds: f64) -> f64 {
    if probability <= 0.0 || probability >= 1.0 || odds <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - probability;
    (odds * probability - q) / odds
}

/// Recommended stake: `bankroll × fraction × f*`, or 0 without a positive edge.
pub fn kelly_size(bankroll: f64, probability: f64, odds: f64, fraction: f64) -> f64 {
    let kelly = kelly_fraction(probability, odds);
    if kelly <= 0.0 {
        debug!(probability, odds, kelly, "Non-positive Kelly, no bet");
        return 0.0;
    }
    bankroll * fraction * kelly
}

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Stake for a win probability under the configured odds and fraction.
    pub fn size(&self, bankroll: f64, probability: f64) -> f64 {
        kelly_size(bankroll, probability, self.config.odds, self.config.fraction)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
