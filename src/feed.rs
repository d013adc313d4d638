//! Spot price feed.
//!
//! Whatever produces prices sends `PriceUpdate`s down a channel and the
//! engine keeps the latest one per symbol. `SimulatedFeed` is the paper-mode
//! producer: a Gaussian random walk driven by an injected RNG.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::shutdown::Shutdown;

pub type PriceSender = mpsc::UnboundedSender<PriceUpdate>;
pub type PriceReceiver = mpsc::UnboundedReceiver<PriceUpdate>;

pub fn price_channel() -> (PriceSender, PriceReceiver) {
    mpsc::unbounded_channel()
}

/// One price tick from a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl PriceUpdate {
    pub fn new(symbol: impl Into<String>, price: f64, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Latest price per symbol. Symbols are case-insensitive.
#[derive(Debug, Default)]
pub struct SpotPrices {
    latest: HashMap<String, PriceUpdate>,
}

impl SpotPrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an update unless it is older than the one already held.
    pub fn update(&mut self, update: PriceUpdate) {
        let key = update.symbol.to_lowercase();
        if let Some(current) = self.latest.get(&key) {
            if update.timestamp < current.timestamp {
                trace!(symbol = %key, "Stale price update dropped");
                return;
            }
        }
        trace!(symbol = %key, price = update.price, source = %update.source, "Spot price");
        self.latest.insert(key, update);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.latest(symbol).map(|u| u.price)
    }

    pub fn latest(&self, symbol: &str) -> Option<&PriceUpdate> {
        self.latest.get(&symbol.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Simulated feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Run the random-walk feed in place of a live source.
    pub simulated: bool,
    pub base_price: f64,
    /// Standard deviation of each step's return.
    pub volatility: f64,
    pub tick_interval_ms: u64,
    /// Fixed seed for reproducible walks; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            simulated: true,
            base_price: 100_000.0,
            volatility: 0.001,
            tick_interval_ms: 500,
            seed: None,
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Random-walk spot prices: each step multiplies the price by `1 + shock`,
/// shock drawn from N(0, volatility).
pub struct SimulatedFeed<R> {
    symbol: String,
    price: f64,
    shocks: Normal<f64>,
    rng: R,
}

impl<R: Rng> SimulatedFeed<R> {
    pub fn new(symbol: impl Into<String>, base_price: f64, volatility: f64, rng: R) -> Result<Self> {
        anyhow::ensure!(
            base_price.is_finite() && base_price > 0.0,
            "base price must be positive, got {base_price}"
        );
        let shocks = Normal::new(0.0, volatility)
            .with_context(|| format!("invalid feed volatility {volatility}"))?;
        Ok(Self {
            symbol: symbol.into(),
            price: base_price,
            shocks,
            rng,
        })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    /// Advance the walk one step.
    pub fn next_update(&mut self) -> PriceUpdate {
        let shock = self.shocks.sample(&mut self.rng);
        // A shock at or below -100% would zero the price; keep it positive.
        self.price = (self.price * (1.0 + shock)).max(f64::MIN_POSITIVE);
        PriceUpdate::new(self.symbol.clone(), self.price, "simulated")
    }
}

impl<R: Rng + Send + 'static> SimulatedFeed<R> {
    /// Publish one step per interval until shutdown or until the receiver
    /// is gone.
    pub fn spawn(
        mut self,
        prices: PriceSender,
        interval: Duration,
        mut shutdown: Shutdown,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                symbol = %self.symbol,
                start = format!("${:.2}", self.price),
                "Simulated price feed started"
            );
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        if prices.send(self.next_update()).is_err() {
                            debug!("Price receiver dropped");
                            break;
                        }
                    }
                }
            }
            info!(last = format!("${:.2}", self.price), "Simulated price feed stopped");
        })
    }
}
