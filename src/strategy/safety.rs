//! Safety monitor.
//!
//! Per-tick protective checks:
//! 1. Gamma stop: too close to expiry, where price moves get violent.
//! 2. Stop loss: the held leg is too far under water.
//! 3. Position timeout: a leg has been held without a hedge for too long.
//! 4. Order validation: price range and notional cap.
//!
//! Stops are control signals for the engine's emergency exit, not errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::pricing::{FairValues, MAX_PRICE, MIN_PRICE};
use crate::engine::ledger::Inventory;
use crate::types::{ArbError, Phase, Side};

/// Safety thresholds. Fixed for the engine's lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Cancel everything within this many minutes of expiry.
    pub gamma_stop_minutes: f64,
    /// Max fractional loss on the held leg before bailing out.
    pub stop_loss_threshold: f64,
    /// Max time to hold an unhedged leg.
    pub max_position_age_seconds: f64,
    /// Max notional (USD) per order.
    pub max_single_order_size: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            gamma_stop_minutes: 2.0,
            stop_loss_threshold: 0.15,
            max_position_age_seconds: 600.0,
            max_single_order_size: 500.0,
        }
    }
}

/// A triggered protective check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SafetyStop {
    GammaStop { seconds_to_expiry: f64 },
    StopLoss { side: Side, loss_pct: f64 },
    PositionTimeout { elapsed_secs: f64 },
}

impl fmt::Display for SafetyStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyStop::GammaStop { seconds_to_expiry } => {
                write!(f, "Gamma stop: {seconds_to_expiry:.0}s to expiry")
            }
            SafetyStop::StopLoss { side, loss_pct } => {
                write!(f, "Stop loss: {side} down {:.1}%", loss_pct * 100.0)
            }
            SafetyStop::PositionTimeout { elapsed_secs } => {
                write!(f, "Position timeout: legged for {elapsed_secs:.0}s")
            }
        }
    }
}

pub struct SafetyMonitor {
    config: SafetyConfig,
    legged_at: Option<DateTime<Utc>>,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            legged_at: None,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// When the current leg was first observed, if legged.
    pub fn legged_at(&self) -> Option<DateTime<Utc>> {
        self.legged_at
    }

    pub fn check_gamma_stop(&self, seconds_to_expiry: f64) -> bool {
        let threshold = self.config.gamma_stop_minutes * 60.0;
        let triggered = seconds_to_expiry < threshold;
        if triggered {
            warn!(
                seconds_to_expiry = format!("{seconds_to_expiry:.0}"),
                threshold_secs = format!("{threshold:.0}"),
                "GAMMA STOP"
            );
        }
        triggered
    }

    /// Fractional loss of `current_price` against `cost_basis`, if it breaches
    /// the threshold. Never triggers without a positive cost basis.
    fn stop_loss_breach(&self, current_price: f64, cost_basis: f64) -> Option<f64> {
        if cost_basis <= 0.0 {
            return None;
        }
        let loss_pct = (cost_basis - current_price) / cost_basis;
        (loss_pct > self.config.stop_loss_threshold).then_some(loss_pct)
    }

    pub fn check_stop_loss(&self, current_price: f64, cost_basis: f64) -> bool {
        match self.stop_loss_breach(current_price, cost_basis) {
            Some(loss_pct) => {
                warn!(
                    loss = format!("{:.1}%", loss_pct * 100.0),
                    cost_basis = format!("{cost_basis:.4}"),
                    current = format!("{current_price:.4}"),
                    "STOP LOSS"
                );
                true
            }
            None => false,
        }
    }

    /// Track how long a leg has been held.
    ///
    /// The clock starts the first time a legged phase is seen and clears
    /// whenever the phase is NEUTRAL. LOCKED neither starts nor clears it.
    pub fn check_position_timeout(&mut self, phase: Phase, now: DateTime<Utc>) -> bool {
        self.position_age(phase, now)
            .is_some_and(|elapsed| elapsed > self.config.max_position_age_seconds)
    }

    fn position_age(&mut self, phase: Phase, now: DateTime<Utc>) -> Option<f64> {
        match phase {
            Phase::Neutral => {
                self.legged_at = None;
                None
            }
            Phase::LeggedYes | Phase::LeggedNo => {
                let since = *self.legged_at.get_or_insert(now);
                let elapsed = (now - since).num_milliseconds() as f64 / 1000.0;
                if elapsed > self.config.max_position_age_seconds {
                    warn!(
                        elapsed_secs = format!("{elapsed:.0}"),
                        max_secs = format!("{:.0}", self.config.max_position_age_seconds),
                        "POSITION TIMEOUT"
                    );
                }
                Some(elapsed)
            }
            Phase::Locked => None,
        }
    }

    /// Forget the current leg's start time (after an emergency reset).
    pub fn clear_position_clock(&mut self) {
        self.legged_at = None;
    }

    /// Run every stop check in order: gamma stop, position timeout, stop loss.
    ///
    /// `seconds_to_expiry` is `None` when no expiry is known, which disables
    /// the gamma stop. The stop loss compares the held leg's fair value
    /// against its average cost.
    pub fn evaluate(
        &mut self,
        phase: Phase,
        inventory: &Inventory,
        fair_values: Option<FairValues>,
        seconds_to_expiry: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<SafetyStop> {
        if let Some(seconds_to_expiry) = seconds_to_expiry {
            if self.check_gamma_stop(seconds_to_expiry) {
                return Some(SafetyStop::GammaStop { seconds_to_expiry });
            }
        }

        if let Some(elapsed_secs) = self.position_age(phase, now) {
            if elapsed_secs > self.config.max_position_age_seconds {
                return Some(SafetyStop::PositionTimeout { elapsed_secs });
            }
        }

        let side = phase.held_side()?;
        let current = fair_values?.side(side);
        let cost_basis = inventory.side(side).avg_cost();
        if self.check_stop_loss(current, cost_basis) {
            let loss_pct = (cost_basis - current) / cost_basis;
            return Some(SafetyStop::StopLoss { side, loss_pct });
        }
        None
    }

    /// Reject prices outside 0.01–0.99.
    pub fn validate_price(&self, price: f64) -> Result<(), ArbError> {
        if (MIN_PRICE..=MAX_PRICE).contains(&price) {
            Ok(())
        } else {
            warn!(price = format!("{price:.4}"), "Invalid price (must be 0.01-0.99)");
            Err(ArbError::PriceOutOfRange(price))
        }
    }

    /// Cap an order's notional at the configured maximum.
    pub fn validate_order_size(&self, notional: f64) -> f64 {
        let max = self.config.max_single_order_size;
        if notional > max {
            let finding = ArbError::SizeExceedsLimit {
                requested: notional,
                max,
            };
            warn!(finding = %finding, "Clamping order size");
            return max;
        }
        notional
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
