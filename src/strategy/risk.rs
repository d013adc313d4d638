//! Daily risk limits.
//!
//! Tracks realised P&L and trade count for the current session and gates
//! trading once either limit is hit. Counters only reset through an
//! explicit `reset_daily` call.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Halt once the day's P&L falls below `-max_daily_loss` (USD).
    /// `inf` disables the loss check.
    pub max_daily_loss: f64,
    /// Halt once this many trades have been recorded.
    pub max_daily_trades: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: 100.0,
            max_daily_trades: 100,
        }
    }
}

/// Snapshot of the day's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskStats {
    pub daily_pnl: Decimal,
    pub daily_trades: u64,
    /// `None` when no loss limit applies.
    pub max_daily_loss: Option<Decimal>,
    pub max_daily_trades: u64,
    pub session_start: DateTime<Utc>,
}

pub struct RiskLimits {
    max_daily_loss: Option<Decimal>,
    max_daily_trades: u64,
    daily_pnl: Decimal,
    daily_trade_count: u64,
    session_start: DateTime<Utc>,
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}

/// Convert the configured loss limit.
///
/// `+inf`, NaN and values beyond `Decimal` range never trip the check, so
/// they mean no limit. `-inf` trips it on any P&L.
fn loss_limit(value: f64) -> Option<Decimal> {
    if value == f64::NEG_INFINITY {
        return Some(Decimal::MIN);
    }
    to_decimal(value)
}

impl RiskLimits {
    pub fn new(config: RiskConfig) -> Self {
        let max_daily_loss = loss_limit(config.max_daily_loss);
        if max_daily_loss.is_none() {
            warn!(
                max_daily_loss = config.max_daily_loss,
                "No daily loss limit in effect"
            );
        }
        Self {
            max_daily_loss,
            max_daily_trades: config.max_daily_trades,
            daily_pnl: Decimal::ZERO,
            daily_trade_count: 0,
            session_start: Utc::now(),
        }
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn daily_trade_count(&self) -> u64 {
        self.daily_trade_count
    }

    /// Add a realised P&L amount and count one trade.
    pub fn record_pnl(&mut self, amount: f64) {
        match to_decimal(amount) {
            Some(amount) => self.daily_pnl += amount,
            None => warn!(amount, "Non-finite P&L ignored"),
        }
        self.daily_trade_count += 1;
        info!(
            daily_pnl = %self.daily_pnl.round_dp(4),
            trades = self.daily_trade_count,
            "P&L recorded"
        );
    }

    /// Whether trading may continue, with the reason when it may not.
    pub fn can_trade(&self) -> (bool, String) {
        if let Some(max_loss) = self.max_daily_loss {
            if self.daily_pnl < -max_loss {
                return (
                    false,
                    format!(
                        "Daily loss limit hit: {} < -{}",
                        self.daily_pnl.round_dp(2),
                        max_loss.round_dp(2)
                    ),
                );
            }
        }
        if self.daily_trade_count >= self.max_daily_trades {
            return (
                false,
                format!(
                    "Daily trade limit hit: {}/{}",
                    self.daily_trade_count, self.max_daily_trades
                ),
            );
        }
        (true, "OK".to_string())
    }

    /// Start a new trading day.
    pub fn reset_daily(&mut self) {
        info!(
            final_pnl = %self.daily_pnl.round_dp(4),
            trades = self.daily_trade_count,
            "Daily risk counters reset"
        );
        self.daily_pnl = Decimal::ZERO;
        self.daily_trade_count = 0;
        self.session_start = Utc::now();
    }

    pub fn stats(&self) -> RiskStats {
        RiskStats {
            daily_pnl: self.daily_pnl,
            daily_trades: self.daily_trade_count,
            max_daily_loss: self.max_daily_loss,
            max_daily_trades: self.max_daily_trades,
            session_start: self.session_start,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
