//! Paper gateway.
//!
//! In-memory simulated exchange. Resting bids fill once the simulated ask
//! drops to their price (checked by `refresh_order_status`), market buys
//! fill immediately at the best ask, and tests can force fills directly.
//! Every fill is pushed onto the fill channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FillSender, OrderGateway};
use crate::types::{BookLevel, FillEvent, Order, OrderBook, OrderStatus, Side};

/// Fill price for a market buy against an empty ask side.
const FALLBACK_ASK: f64 = 0.55;
/// Depth given to each simulated level.
const SIMULATED_DEPTH: f64 = 100.0;

#[derive(Default)]
struct PaperState {
    /// Insertion order is kept for deterministic iteration.
    orders: Vec<Order>,
    index: HashMap<String, usize>,
    yes_book: OrderBook,
    no_book: OrderBook,
}

impl PaperState {
    fn book(&self, side: Side) -> &OrderBook {
        match side {
            Side::Yes => &self.yes_book,
            Side::No => &self.no_book,
        }
    }

    fn book_mut(&mut self, side: Side) -> &mut OrderBook {
        match side {
            Side::Yes => &mut self.yes_book,
            Side::No => &mut self.no_book,
        }
    }

    fn order_mut(&mut self, id: &str) -> Option<&mut Order> {
        let idx = *self.index.get(id)?;
        self.orders.get_mut(idx)
    }

    fn insert(&mut self, order: Order) {
        self.index.insert(order.id.clone(), self.orders.len());
        self.orders.push(order);
    }
}

fn simulated_book(bid: f64, ask: f64) -> OrderBook {
    OrderBook::new(
        vec![BookLevel::new(bid, SIMULATED_DEPTH)],
        vec![BookLevel::new(ask, SIMULATED_DEPTH)],
    )
}

fn paper_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

pub struct PaperGateway {
    state: Mutex<PaperState>,
    fills: FillSender,
}

impl PaperGateway {
    /// New paper venue with the default books: YES 0.50/0.52, NO 0.48/0.50.
    pub fn new(fills: FillSender) -> Self {
        let state = PaperState {
            yes_book: simulated_book(0.50, 0.52),
            no_book: simulated_book(0.48, 0.50),
            ..PaperState::default()
        };
        info!("Paper trading gateway initialised");
        Self {
            state: Mutex::new(state),
            fills,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("paper gateway state poisoned"))
    }

    fn emit(&self, fill: FillEvent) {
        info!(fill = %fill, "[PAPER] Fill");
        if self.fills.send(fill).is_err() {
            debug!("Fill receiver dropped, fill not delivered");
        }
    }

    /// Replace one side's simulated book with a single bid/ask level.
    pub fn update_simulated_book(&self, side: Side, best_bid: f64, best_ask: f64) -> Result<()> {
        let mut state = self.lock()?;
        *state.book_mut(side) = simulated_book(best_bid, best_ask);
        debug!(side = %side, bid = best_bid, ask = best_ask, "[PAPER] Book updated");
        Ok(())
    }

    /// Fill an active order in full, at `price` or its own limit.
    ///
    /// Returns `false` for unknown or inactive orders.
    pub fn simulate_fill(&self, order_id: &str, price: Option<f64>) -> Result<bool> {
        let fill = {
            let mut state = self.lock()?;
            let Some(order) = state.order_mut(order_id).filter(|o| o.is_active()) else {
                return Ok(false);
            };
            let price = price.unwrap_or(order.price);
            let qty = order.remaining();
            fill_order(order, price);
            FillEvent::for_order(order, price, qty)
        };
        self.emit(fill);
        Ok(true)
    }

    /// Active orders, optionally restricted to one side.
    pub fn open_orders(&self, side: Option<Side>) -> Result<Vec<Order>> {
        let state = self.lock()?;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.is_active() && side.map_or(true, |s| o.side == s))
            .cloned()
            .collect())
    }

    /// Snapshot of any order ever placed.
    pub fn order(&self, order_id: &str) -> Result<Option<Order>> {
        let state = self.lock()?;
        Ok(state
            .index
            .get(order_id)
            .and_then(|&idx| state.orders.get(idx))
            .cloned())
    }
}

fn fill_order(order: &mut Order, price: f64) {
    order.status = OrderStatus::Filled;
    order.filled_qty = order.size;
    order.filled_avg_price = price;
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_limit_buy(&self, side: Side, price: f64, size: f64) -> Result<Order> {
        let order = Order::open(paper_id("paper"), side, price, size);
        self.lock()?.insert(order.clone());
        info!(
            order_id = %order.id,
            side = %side,
            size = format!("{size:.2}"),
            price = format!("{price:.4}"),
            "[PAPER] Placed bid"
        );
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        match state.order_mut(order_id) {
            Some(order) if order.is_active() => {
                order.status = OrderStatus::Cancelled;
                info!(order_id, "[PAPER] Cancelled order");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_all_orders(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let mut count = 0;
        for order in state.orders.iter_mut().filter(|o| o.is_active()) {
            order.status = OrderStatus::Cancelled;
            count += 1;
        }
        info!(count, "[PAPER] Cancelled all orders");
        Ok(count)
    }

    async fn market_buy(&self, side: Side, size: f64) -> Result<Order> {
        let order = {
            let mut state = self.lock()?;
            let price = state.book(side).best_ask().unwrap_or(FALLBACK_ASK);
            let mut order = Order::open(paper_id("paper_mkt"), side, price, size);
            fill_order(&mut order, price);
            state.insert(order.clone());
            order
        };
        info!(
            side = %side,
            size = format!("{size:.2}"),
            price = format!("{:.4}", order.price),
            "[PAPER] Market buy"
        );
        self.emit(FillEvent::for_order(&order, order.price, order.size));
        Ok(order)
    }

    async fn get_order_book(&self, side: Side) -> OrderBook {
        match self.lock() {
            Ok(state) => state.book(side).clone(),
            Err(e) => {
                warn!(side = %side, error = %e, "[PAPER] Book unavailable");
                OrderBook::empty()
            }
        }
    }

    async fn refresh_order_status(&self, order_id: &str) -> Result<Option<Order>> {
        let (order, fill) = {
            let mut state = self.lock()?;
            let Some(&idx) = state.index.get(order_id) else {
                return Ok(None);
            };
            let best_ask = state.book(state.orders[idx].side).best_ask();
            let order = state
                .orders
                .get_mut(idx)
                .context("paper order index out of sync")?;

            let crossed = order.is_active() && best_ask.is_some_and(|ask| order.price >= ask);
            let fill = if crossed {
                let qty = order.remaining();
                let price = order.price;
                fill_order(order, price);
                Some(FillEvent::for_order(order, price, qty))
            } else {
                None
            };
            (order.clone(), fill)
        };

        if let Some(fill) = fill {
            self.emit(fill);
        }
        Ok(Some(order))
    }

    async fn active_order_ids(&self) -> Vec<String> {
        match self.lock() {
            Ok(state) => state
                .orders
                .iter()
                .filter(|o| o.is_active())
                .map(|o| o.id.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
