//! Mock order gateway for integration testing.
//!
//! A deterministic `OrderGateway` that records every call and never fills
//! anything on its own. Order books and forced errors are controllable
//! from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use legged_arb::gateway::OrderGateway;
use legged_arb::types::{BookLevel, Order, OrderBook, OrderStatus, Side};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LimitBuy { side: Side, price: f64, size: f64 },
    Cancel(String),
    CancelAll,
    MarketBuy { side: Side, size: f64 },
}

#[derive(Clone, Default)]
pub struct MockGateway {
    orders: Arc<Mutex<Vec<Order>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    yes_book: Arc<Mutex<OrderBook>>,
    no_book: Arc<Mutex<OrderBook>>,
    next_id: Arc<Mutex<u64>>,
    /// If set, every fallible operation returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one side's book with a single level.
    pub fn set_book(&self, side: Side, bid: f64, ask: f64) {
        let book = OrderBook::new(
            vec![BookLevel::new(bid, 100.0)],
            vec![BookLevel::new(ask, 100.0)],
        );
        match side {
            Side::Yes => *self.yes_book.lock().unwrap() = book,
            Side::No => *self.no_book.lock().unwrap() = book,
        }
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.is_active())
            .cloned()
            .collect()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{next}")
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn place_limit_buy(&self, side: Side, price: f64, size: f64) -> Result<Order> {
        self.record(Call::LimitBuy { side, price, size });
        self.check_error()?;
        let order = Order::open(self.next_id("mock"), side, price, size);
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        self.record(Call::Cancel(order_id.to_string()));
        self.check_error()?;
        let mut orders = self.orders.lock().unwrap();
        match orders.iter_mut().find(|o| o.id == order_id && o.is_active()) {
            Some(order) => {
                order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel_all_orders(&self) -> Result<usize> {
        self.record(Call::CancelAll);
        self.check_error()?;
        let mut orders = self.orders.lock().unwrap();
        let mut count = 0;
        for order in orders.iter_mut().filter(|o| o.is_active()) {
            order.status = OrderStatus::Cancelled;
            count += 1;
        }
        Ok(count)
    }

    async fn market_buy(&self, side: Side, size: f64) -> Result<Order> {
        self.record(Call::MarketBuy { side, size });
        self.check_error()?;
        let price = self.get_order_book(side).await.best_ask().unwrap_or(0.55);
        let mut order = Order::open(self.next_id("mock-mkt"), side, price, size);
        order.status = OrderStatus::Filled;
        order.filled_qty = size;
        order.filled_avg_price = price;
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn get_order_book(&self, side: Side) -> OrderBook {
        match side {
            Side::Yes => self.yes_book.lock().unwrap().clone(),
            Side::No => self.no_book.lock().unwrap().clone(),
        }
    }

    async fn refresh_order_status(&self, order_id: &str) -> Result<Option<Order>> {
        self.check_error()?;
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn active_order_ids(&self) -> Vec<String> {
        self.open_orders().into_iter().map(|o| o.id).collect()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
