//! Shared types for the legged arbitrage engine.
//!
//! These types form the data model used across all modules.
//! They are kept free of engine logic so that the gateway, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the two complementary instruments of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The complementary side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Parse a side label as reported by a gateway (case-insensitive).
impl std::str::FromStr for Side {
    type Err = ArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            _ => Err(ArbError::InvalidSide(s.to_string())),
        }
    }
}

/// Trading phase of the engine.
///
/// Tracked explicitly rather than derived from inventory so that every
/// change can be validated against the adjacency table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Flat. Bidding on both sides.
    #[default]
    Neutral,
    /// Holding YES, chasing NO.
    LeggedYes,
    /// Holding NO, chasing YES.
    LeggedNo,
    /// Both sides held; profit locked until settlement.
    Locked,
}

impl Phase {
    /// Phases reachable from `self` through a normal transition.
    pub fn successors(&self) -> &'static [Phase] {
        match self {
            Phase::Neutral => &[Phase::LeggedYes, Phase::LeggedNo],
            Phase::LeggedYes => &[Phase::Locked, Phase::Neutral],
            Phase::LeggedNo => &[Phase::Locked, Phase::Neutral],
            Phase::Locked => &[Phase::Neutral],
        }
    }

    /// The side currently held while legged.
    pub fn held_side(&self) -> Option<Side> {
        match self {
            Phase::LeggedYes => Some(Side::Yes),
            Phase::LeggedNo => Some(Side::No),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Neutral => write!(f, "NEUTRAL"),
            Phase::LeggedYes => write!(f, "LEGGED_YES"),
            Phase::LeggedNo => write!(f, "LEGGED_NO"),
            Phase::Locked => write!(f, "LOCKED"),
        }
    }
}

/// Lifecycle status of an order at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A buy order on one side of the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: Side,
    /// Limit price (0.01–0.99)
    pub price: f64,
    /// Size in shares
    pub size: f64,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub filled_avg_price: f64,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {:.2}@{:.4} ({:?}, filled {:.2})",
            self.id, self.side, self.size, self.price, self.status, self.filled_qty,
        )
    }
}

impl Order {
    /// A freshly accepted resting order.
    pub fn open(id: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Self {
            id: id.into(),
            side,
            price,
            size,
            status: OrderStatus::Open,
            filled_qty: 0.0,
            filled_avg_price: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Shares still unfilled.
    pub fn remaining(&self) -> f64 {
        self.size - self.filled_qty
    }

    /// Whether the order can still fill.
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// One price level of a book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// Snapshot of one side's book. Bids descend, asks ascend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Build a book, sorting levels into best-first order.
    pub fn new(mut bids: Vec<BookLevel>, mut asks: Vec<BookLevel>) -> Self {
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        Self { bids, asks }
    }

    /// A book with no levels (what gateways return on fetch failure).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// `best_ask - best_bid`, if both exist.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_px = |p: Option<f64>| p.map_or_else(|| "-".to_string(), |p| format!("{p:.4}"));
        write!(
            f,
            "bid={} ask={} ({}x{} levels)",
            fmt_px(self.best_bid()),
            fmt_px(self.best_ask()),
            self.bids.len(),
            self.asks.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Fill events
// ---------------------------------------------------------------------------

/// A fill reported by a gateway.
///
/// The side is carried as the raw label the gateway reported; it is only
/// parsed when the fill is applied to the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub side: String,
    pub price: f64,
    pub qty: f64,
    pub order_id: Option<String>,
}

impl FillEvent {
    pub fn new(side: Side, price: f64, qty: f64) -> Self {
        Self {
            side: side.to_string(),
            price,
            qty,
            order_id: None,
        }
    }

    pub fn for_order(order: &Order, price: f64, qty: f64) -> Self {
        Self {
            order_id: Some(order.id.clone()),
            ..Self::new(order.side, price, qty)
        }
    }
}

impl fmt::Display for FillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}@{:.4}", self.side, self.qty, self.price)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Invalid side: {0:?}")]
    InvalidSide(String),

    #[error("Volatility must be positive, got {0}")]
    InvalidVolatility(f64),

    #[error("Price {0:.4} outside 0.01-0.99")]
    PriceOutOfRange(f64),

    #[error("Order notional ${requested:.2} exceeds max ${max:.2}")]
    SizeExceedsLimit { requested: f64, max: f64 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
