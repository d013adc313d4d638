//! Order gateways.
//!
//! Defines the `OrderGateway` trait the engine trades through and the
//! background fill poller. Implementations:
//! - Paper: in-memory simulated exchange for dry runs and tests
//!
//! Gateways report fills by pushing `FillEvent`s onto a channel; the engine
//! drains that channel from its own loop, so fills never touch engine state
//! from another task.

pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;
use crate::types::{FillEvent, Order, OrderBook, Side};

/// Sending half of the fill channel held by a gateway.
pub type FillSender = mpsc::UnboundedSender<FillEvent>;
/// Receiving half consumed by the engine loop.
pub type FillReceiver = mpsc::UnboundedReceiver<FillEvent>;

pub fn fill_channel() -> (FillSender, FillReceiver) {
    mpsc::unbounded_channel()
}

/// Abstraction over the venue orders are sent to.
///
/// The engine never branches on which implementation it holds. Retries and
/// backoff are the implementation's business; a failed call simply means
/// the action did not happen this tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Rest a limit buy on one side.
    async fn place_limit_buy(&self, side: Side, price: f64, size: f64) -> Result<Order>;

    /// Cancel one order. `false` if unknown or already terminal.
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    /// Cancel every active order, returning how many were cancelled.
    async fn cancel_all_orders(&self) -> Result<usize>;

    /// Buy immediately at the best available price.
    async fn market_buy(&self, side: Side, size: f64) -> Result<Order>;

    /// Current book for one side. Implementations return an empty book
    /// rather than an error when the fetch fails.
    async fn get_order_book(&self, side: Side) -> OrderBook;

    /// Re-read an order's status, emitting a fill event if it newly filled.
    async fn refresh_order_status(&self, order_id: &str) -> Result<Option<Order>>;

    /// Ids of all orders that can still fill.
    async fn active_order_ids(&self) -> Vec<String>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}

/// Poll every active order for fills until shutdown.
///
/// This is the gateway's own background activity; fills it detects reach
/// the engine through the gateway's fill channel.
pub fn spawn_fill_poller(
    gateway: Arc<dyn OrderGateway>,
    interval: Duration,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            gateway = gateway.name(),
            interval_ms = interval.as_millis() as u64,
            "Fill poller started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let ids = gateway.active_order_ids().await;
                    debug!(open_orders = ids.len(), "Polling orders");
                    for id in ids {
                        if let Err(e) = gateway.refresh_order_status(&id).await {
                            warn!(order_id = %id, error = %e, "Order refresh failed");
                        }
                    }
                }
            }
        }
        info!("Fill poller stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
