//! Order executor.
//!
//! Sends orders through the gateway and tracks the one resting order the
//! engine may have on each side. Bids are always cancel-then-place, so a
//! side never carries two live engine orders.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::gateway::OrderGateway;
use crate::strategy::{self, safety::SafetyMonitor};
use crate::types::{FillEvent, Order, Side};

// ---------------------------------------------------------------------------
// Active-order tracker
// ---------------------------------------------------------------------------

/// Resting order id per side, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveOrders {
    pub yes: Option<String>,
    pub no: Option<String>,
}

impl ActiveOrders {
    pub fn get(&self, side: Side) -> Option<&str> {
        match side {
            Side::Yes => self.yes.as_deref(),
            Side::No => self.no.as_deref(),
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<String> {
        match side {
            Side::Yes => &mut self.yes,
            Side::No => &mut self.no,
        }
    }

    pub fn clear_all(&mut self) {
        self.yes = None;
        self.no = None;
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    gateway: Arc<dyn OrderGateway>,
    active: ActiveOrders,
}

impl Executor {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            gateway,
            active: ActiveOrders::default(),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn OrderGateway> {
        &self.gateway
    }

    pub fn active_orders(&self) -> &ActiveOrders {
        &self.active
    }

    /// Cancel the tracked order on `side`, if any.
    ///
    /// The slot is only cleared once the gateway has answered; on a failed
    /// call the order may still be live and stays tracked.
    pub async fn cancel_side(&mut self, side: Side) -> anyhow::Result<()> {
        let Some(order_id) = self.active.get(side).map(str::to_owned) else {
            return Ok(());
        };
        match self.gateway.cancel_order(&order_id).await {
            Ok(cancelled) => {
                debug!(side = %side, order_id = %order_id, cancelled, "Side order cancelled");
                *self.active.slot_mut(side) = None;
                Ok(())
            }
            Err(e) => {
                warn!(side = %side, order_id = %order_id, error = %e, "Cancel failed");
                Err(e)
            }
        }
    }

    /// Replace the resting bid on `side` with a new one at `price`.
    ///
    /// Skips the order (returns `None`) when the price fails validation, when
    /// the old order could not be cancelled, or when the gateway rejects it.
    /// The notional is capped by the safety monitor before sizing.
    pub async fn place_bid(
        &mut self,
        safety: &SafetyMonitor,
        side: Side,
        price: f64,
        notional: f64,
    ) -> Option<Order> {
        if let Err(e) = safety.validate_price(price) {
            debug!(side = %side, error = %e, "Bid skipped");
            return None;
        }
        if self.cancel_side(side).await.is_err() {
            return None;
        }

        let notional = safety.validate_order_size(notional);
        let size = strategy::shares_at(notional, price);

        match self.gateway.place_limit_buy(side, price, size).await {
            Ok(order) => {
                if order.is_active() {
                    *self.active.slot_mut(side) = Some(order.id.clone());
                }
                debug!(order = %order, "Bid placed");
                Some(order)
            }
            Err(e) => {
                warn!(
                    side = %side,
                    price = format!("{price:.4}"),
                    error = %e,
                    "Bid placement failed"
                );
                None
            }
        }
    }

    /// Cross the spread for `size` shares on `side`.
    pub async fn market_buy(&mut self, side: Side, size: f64) -> Option<Order> {
        match self.gateway.market_buy(side, size).await {
            Ok(order) => {
                info!(order = %order, "Market buy executed");
                Some(order)
            }
            Err(e) => {
                warn!(side = %side, size = format!("{size:.2}"), error = %e, "Market buy failed");
                None
            }
        }
    }

    /// Cancel every resting order at the venue and forget the tracked ids.
    pub async fn cancel_all(&mut self) -> anyhow::Result<usize> {
        let count = self.gateway.cancel_all_orders().await?;
        self.active.clear_all();
        Ok(count)
    }

    /// Drop the tracked order a fill belongs to.
    ///
    /// A fill that names a different order than the one tracked on its side
    /// (a market buy, say) leaves the resting order tracked.
    pub fn on_fill(&mut self, side: Side, fill: &FillEvent) {
        let slot = self.active.slot_mut(side);
        let matches = match (&fill.order_id, slot.as_deref()) {
            (Some(filled), Some(tracked)) => filled == tracked,
            _ => true,
        };
        if matches {
            *slot = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
