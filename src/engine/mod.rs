//! Core engine: the tick-driven legged arbitrage loop.
//!
//! Each tick runs the safety checks, consults the daily risk gate, prices
//! both sides, then hands off to the handler for the current phase:
//!
//! - NEUTRAL (fisher): rest skewed bids on both sides
//! - LEGGED_* (trapper): chase the missing side, crossing when the ask allows
//! - LOCKED (vault): pull all orders and wait for settlement
//!
//! Fills and price updates arrive on channels and are applied by the same
//! task that runs ticks, so engine state has a single writer.

pub mod emergency;
pub mod executor;
pub mod ledger;
pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::feed::{PriceReceiver, PriceUpdate, SpotPrices};
use crate::gateway::{FillReceiver, OrderGateway};
use crate::shutdown::Shutdown;
use crate::strategy::pricing::{self, FairValueModel, FairValues};
use crate::strategy::risk::{RiskConfig, RiskLimits, RiskStats};
use crate::strategy::safety::{SafetyConfig, SafetyMonitor, SafetyStop};
use crate::strategy::TradingConfig;
use crate::types::{ArbError, FillEvent, Phase, Side};
use emergency::{emergency_exit, EmergencyReport};
use executor::{ActiveOrders, Executor};
use state_machine::{StateMachine, StateSummary};

// ---------------------------------------------------------------------------
// Settings and outputs
// ---------------------------------------------------------------------------

/// Everything the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Spot symbol fed to the fair-value model.
    pub symbol: String,
    pub model: FairValueModel,
    pub trading: TradingConfig,
    pub safety: SafetyConfig,
    pub risk: RiskConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbol: "btcusdt".to_string(),
            model: FairValueModel::default(),
            trading: TradingConfig::default(),
            safety: SafetyConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Neutral bids computed for both sides.
    Fisher { yes_bid: f64, no_bid: f64 },
    /// Hedge bought at market because the ask was within the hedge ceiling.
    TrapperCrossed { side: Side, ask: f64, max_price: f64 },
    /// Hedge bid rested at the ceiling.
    TrapperBid { side: Side, price: f64 },
    /// The hedge side's resting bid could not be cancelled; nothing sent.
    TrapperStalled { side: Side },
    /// Both sides held; orders pulled.
    Vault { locked_profit: f64 },
    /// A protective check fired and the emergency exit ran.
    SafetyStop {
        stop: SafetyStop,
        report: EmergencyReport,
    },
    /// The daily risk gate refused trading.
    RiskHalted(String),
    /// The model needs a spot price or expiry it does not have yet.
    NoFairValue,
}

/// Snapshot for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    pub phase: Phase,
    pub position: StateSummary,
    pub risk: RiskStats,
    pub active_orders: ActiveOrders,
    pub tick_count: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub spot_price: Option<f64>,
    pub expiry: Option<DateTime<Utc>>,
    pub last_emergency: Option<EmergencyReport>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LeggedArbEngine {
    settings: EngineSettings,
    state: StateMachine,
    safety: SafetyMonitor,
    risk: RiskLimits,
    executor: Executor,
    spot: SpotPrices,
    expiry: Option<DateTime<Utc>>,
    tick_count: u64,
    last_tick: Option<DateTime<Utc>>,
    last_emergency: Option<EmergencyReport>,
    status_tx: watch::Sender<EngineStatus>,
}

impl LeggedArbEngine {
    pub fn new(settings: EngineSettings, gateway: Arc<dyn OrderGateway>) -> Self {
        let (status_tx, _) = watch::channel(EngineStatus::default());
        let engine = Self {
            safety: SafetyMonitor::new(settings.safety.clone()),
            risk: RiskLimits::new(settings.risk.clone()),
            settings,
            state: StateMachine::new(),
            executor: Executor::new(gateway),
            spot: SpotPrices::new(),
            expiry: None,
            tick_count: 0,
            last_tick: None,
            last_emergency: None,
            status_tx,
        };
        engine.publish();
        engine
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn risk(&self) -> &RiskLimits {
        &self.risk
    }

    pub fn active_orders(&self) -> &ActiveOrders {
        self.executor.active_orders()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_emergency(&self) -> Option<&EmergencyReport> {
        self.last_emergency.as_ref()
    }

    /// Set the settlement time of the current pair.
    pub fn set_expiry(&mut self, expiry: DateTime<Utc>) {
        info!(expiry = %expiry, "Market expiry set");
        self.expiry = Some(expiry);
        self.publish();
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn on_price_update(&mut self, update: PriceUpdate) {
        self.spot.update(update);
    }

    pub fn spot_price(&self) -> Option<f64> {
        self.spot.price(&self.settings.symbol)
    }

    /// Start a new trading day. Never called by the engine itself.
    pub fn reset_daily_limits(&mut self) {
        self.risk.reset_daily();
        self.publish();
    }

    /// Status updates, refreshed after every tick and fill.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.state.phase(),
            position: self.state.summary(),
            risk: self.risk.stats(),
            active_orders: self.executor.active_orders().clone(),
            tick_count: self.tick_count,
            last_tick: self.last_tick,
            spot_price: self.spot_price(),
            expiry: self.expiry,
            last_emergency: self.last_emergency.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    // -- Fills --------------------------------------------------------------

    /// Apply a fill reported by the gateway.
    ///
    /// An unrecognised side is an error and leaves all state untouched.
    /// A fill that locks the pair records `locked_profit × qty` against the
    /// daily limits.
    pub fn handle_fill(&mut self, fill: FillEvent) -> Result<Phase, ArbError> {
        let side: Side = fill.side.parse()?;
        info!(fill = %fill, order_id = ?fill.order_id, "FILL");

        let phase = self.state.on_fill(&fill.side, fill.price, fill.qty)?;
        self.executor.on_fill(side, &fill);

        if phase == Phase::Locked {
            let profit = self.state.inventory().locked_profit() * fill.qty;
            self.risk.record_pnl(profit);
            info!(profit = format!("${profit:.4}"), "LOCKED");
        }

        self.publish();
        Ok(phase)
    }

    // -- Ticks --------------------------------------------------------------

    pub async fn on_tick(&mut self) -> Result<TickOutcome, ArbError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one decision cycle as of `now`.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, ArbError> {
        self.tick_count += 1;
        self.last_tick = Some(now);

        let outcome = self.decide(now).await;
        self.publish();
        outcome
    }

    async fn decide(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, ArbError> {
        let fair = self.fair_values(now)?;

        let seconds_to_expiry = self
            .expiry
            .map(|e| (e - now).num_milliseconds() as f64 / 1000.0);
        let stop = self.safety.evaluate(
            self.state.phase(),
            self.state.inventory(),
            fair,
            seconds_to_expiry,
            now,
        );
        if let Some(stop) = stop {
            let report = self.emergency_stop(&stop.to_string()).await;
            return Ok(TickOutcome::SafetyStop { stop, report });
        }

        let (allowed, reason) = self.risk.can_trade();
        if !allowed {
            warn!(reason = %reason, "Trading disabled");
            return Ok(TickOutcome::RiskHalted(reason));
        }

        let Some(fair) = fair else {
            debug!(tick = self.tick_count, "No fair value yet, skipping tick");
            return Ok(TickOutcome::NoFairValue);
        };

        debug!(
            tick = self.tick_count,
            phase = %self.state.phase(),
            spot = ?self.spot_price(),
            fv_yes = format!("{:.4}", fair.yes),
            fv_no = format!("{:.4}", fair.no),
            "Tick"
        );

        let outcome = match self.state.phase() {
            Phase::Neutral => self.fisher(fair).await,
            Phase::LeggedYes => self.trapper(Side::Yes).await,
            Phase::LeggedNo => self.trapper(Side::No).await,
            Phase::Locked => self.vault().await,
        };
        Ok(outcome)
    }

    /// Price both sides with the configured model.
    ///
    /// `None` when the Black-Scholes model lacks a spot price or an expiry.
    fn fair_values(&self, now: DateTime<Utc>) -> Result<Option<FairValues>, ArbError> {
        let years = match (self.settings.model, self.expiry) {
            (FairValueModel::BlackScholes { .. }, None) => return Ok(None),
            (_, Some(expiry)) => pricing::years_until(expiry, now),
            (_, None) => 0.0,
        };
        self.settings.model.fair_values(self.spot_price(), years)
    }

    /// NEUTRAL: rest inventory-skewed bids on both sides.
    async fn fisher(&mut self, fair: FairValues) -> TickOutcome {
        let trading = &self.settings.trading;
        let inventory = self.state.inventory();
        let yes_bid = pricing::skewed_bid(
            fair.yes,
            inventory.yes.quantity,
            trading.target_margin,
            trading.risk_factor,
        );
        let no_bid = pricing::skewed_bid(
            fair.no,
            inventory.no.quantity,
            trading.target_margin,
            trading.risk_factor,
        );
        let notional = trading.position_size;

        self.executor
            .place_bid(&self.safety, Side::Yes, yes_bid, notional)
            .await;
        self.executor
            .place_bid(&self.safety, Side::No, no_bid, notional)
            .await;

        info!(
            yes = format!("{yes_bid:.4}"),
            no = format!("{no_bid:.4}"),
            "FISHER: bids resting"
        );
        TickOutcome::Fisher { yes_bid, no_bid }
    }

    /// LEGGED: drop the held side's bid and chase the other side.
    async fn trapper(&mut self, held: Side) -> TickOutcome {
        // Failure is logged by the executor; the stale bid gets another
        // cancel attempt next tick.
        let _ = self.executor.cancel_side(held).await;

        let hedge = held.opposite();
        let position = *self.state.inventory().side(held);
        let cost_basis = position.avg_cost();
        let max_price = pricing::hedge_price(cost_basis, self.settings.trading.min_profit);

        let book = self.executor.gateway().get_order_book(hedge).await;
        match book.best_ask() {
            Some(ask) if ask <= max_price => {
                // A resting hedge bid at the ceiling would fill alongside
                // the market buy.
                if self.executor.cancel_side(hedge).await.is_err() {
                    return TickOutcome::TrapperStalled { side: hedge };
                }
                info!(
                    side = %hedge,
                    ask = format!("{ask:.4}"),
                    max = format!("{max_price:.4}"),
                    "TRAPPER: crossing the spread"
                );
                self.executor.market_buy(hedge, position.quantity).await;
                TickOutcome::TrapperCrossed {
                    side: hedge,
                    ask,
                    max_price,
                }
            }
            _ => {
                self.executor
                    .place_bid(
                        &self.safety,
                        hedge,
                        max_price,
                        self.settings.trading.position_size,
                    )
                    .await;
                info!(
                    side = %hedge,
                    price = format!("{max_price:.4}"),
                    held_cost = format!("{cost_basis:.4}"),
                    "TRAPPER: hedge bid resting"
                );
                TickOutcome::TrapperBid {
                    side: hedge,
                    price: max_price,
                }
            }
        }
    }

    /// LOCKED: nothing left to do but wait for settlement.
    async fn vault(&mut self) -> TickOutcome {
        if let Err(e) = self.executor.cancel_all().await {
            warn!(error = %e, "VAULT: cancel-all failed");
        }
        let s = self.state.summary();
        info!(
            profit = format!("${:.4}", s.locked_profit),
            yes = format!("{:.2}@{:.4}", s.yes_qty, s.yes_avg_cost),
            no = format!("{:.2}@{:.4}", s.no_qty, s.no_avg_cost),
            "VAULT: profit locked"
        );
        TickOutcome::Vault {
            locked_profit: s.locked_profit,
        }
    }

    /// Cancel everything, report any stranded leg and reset to NEUTRAL.
    ///
    /// Completes before returning, so the next tick sees the reset state.
    pub async fn emergency_stop(&mut self, reason: &str) -> EmergencyReport {
        let report = emergency_exit(&mut self.executor, &mut self.state, reason).await;
        self.safety.clear_position_clock();
        self.last_emergency = Some(report.clone());
        self.publish();
        report
    }

    // -- Run loop -----------------------------------------------------------

    /// Drive the engine until shutdown or an unrecoverable error.
    ///
    /// Fills are applied ahead of price updates, and both ahead of the next
    /// tick. An error from a tick or a fill triggers the emergency exit and
    /// ends the loop. Every exit path finishes with a cancel-all sweep.
    pub async fn run(
        &mut self,
        mut fills: FillReceiver,
        mut prices: PriceReceiver,
        mut shutdown: Shutdown,
        tick_interval: Duration,
    ) -> anyhow::Result<()> {
        let trading = &self.settings.trading;
        info!(
            gateway = self.executor.gateway().name(),
            model = ?self.settings.model,
            position_size = format!("${:.2}", trading.position_size),
            target_margin = format!("{:.2}%", trading.target_margin * 100.0),
            min_profit = format!("{:.2}%", trading.min_profit * 100.0),
            tick_ms = tick_interval.as_millis() as u64,
            "Starting legged arbitrage engine"
        );

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("Shutdown requested, stopping engine");
                    break Ok(());
                }
                Some(fill) = fills.recv() => {
                    if let Err(e) = self.handle_fill(fill) {
                        error!(error = %e, "Fill handling failed");
                        self.emergency_stop(&format!("Fill handling failed: {e}")).await;
                        break Err(anyhow::Error::new(e).context("fill handling failed"));
                    }
                }
                Some(update) = prices.recv() => {
                    self.on_price_update(update);
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick().await {
                        error!(error = %e, "Tick failed");
                        self.emergency_stop(&format!("Unhandled error: {e}")).await;
                        break Err(anyhow::Error::new(e).context("tick failed"));
                    }
                }
            }
        };

        match self.executor.cancel_all().await {
            Ok(count) => info!(count, "Final order sweep complete"),
            Err(e) => warn!(error = %e, "Final order sweep failed"),
        }
        self.publish();
        info!(ticks = self.tick_count, "Engine stopped");
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
