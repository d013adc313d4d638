//! Inventory ledger.
//!
//! Weighted-average cost tracking for each side of the pair. Positions only
//! accumulate; the only way down is a full reset.

use serde::Serialize;
use tracing::debug;

use crate::types::Side;

/// Guaranteed settlement value of one matched YES+NO pair.
pub const PAYOUT_PER_PAIR: f64 = 1.0;

/// Holdings and cost basis on a single side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub quantity: f64,
    /// Sum of qty × price over every add.
    pub total_cost: f64,
}

impl Position {
    /// Average cost per share, or 0 when flat.
    pub fn avg_cost(&self) -> f64 {
        if self.quantity > 0.0 {
            self.total_cost / self.quantity
        } else {
            0.0
        }
    }

    /// Absorb a fill into the weighted average.
    pub fn add(&mut self, qty: f64, price: f64) {
        self.quantity += qty;
        self.total_cost += qty * price;
        debug!(
            qty,
            price = format!("{price:.4}"),
            avg_cost = format!("{:.4}", self.avg_cost()),
            "Position updated"
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_flat(&self) -> bool {
        self.quantity <= 0.0
    }
}

/// Both sides of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Inventory {
    pub yes: Position,
    pub no: Position,
}

impl Inventory {
    pub fn side(&self, side: Side) -> &Position {
        match side {
            Side::Yes => &self.yes,
            Side::No => &self.no,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut Position {
        match side {
            Side::Yes => &mut self.yes,
            Side::No => &mut self.no,
        }
    }

    /// Cost basis across both sides.
    pub fn total_cost(&self) -> f64 {
        self.yes.total_cost + self.no.total_cost
    }

    /// Number of complete YES+NO pairs held.
    pub fn matched_qty(&self) -> f64 {
        self.yes.quantity.min(self.no.quantity)
    }

    /// Profit guaranteed at settlement on the matched pairs.
    ///
    /// Recomputed from the current averages on every call; zero unless both
    /// sides are held.
    pub fn locked_profit(&self) -> f64 {
        let matched = self.matched_qty();
        if matched <= 0.0 {
            return 0.0;
        }
        (PAYOUT_PER_PAIR - self.yes.avg_cost() - self.no.avg_cost()) * matched
    }

    pub fn reset(&mut self) {
        self.yes.reset();
        self.no.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
