//! End-to-end engine scenarios.
//!
//! Drives the full engine (state machine, safety, risk, executor) against
//! the paper gateway and the recording mock, with fills delivered through
//! the real fill channel.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use legged_arb::engine::{EngineSettings, LeggedArbEngine, TickOutcome};
use legged_arb::feed::{price_channel, PriceUpdate, SimulatedFeed};
use legged_arb::gateway::paper::PaperGateway;
use legged_arb::gateway::{fill_channel, spawn_fill_poller, FillReceiver, OrderGateway};
use legged_arb::shutdown;
use legged_arb::strategy::pricing::FairValueModel;
use legged_arb::strategy::risk::RiskConfig;
use legged_arb::strategy::safety::SafetyStop;
use legged_arb::types::{FillEvent, Phase, Side};

use crate::mock_gateway::{Call, MockGateway};

fn paper_engine(settings: EngineSettings) -> (LeggedArbEngine, Arc<PaperGateway>, FillReceiver) {
    let (fill_tx, fill_rx) = fill_channel();
    let paper = Arc::new(PaperGateway::new(fill_tx));
    let gateway: Arc<dyn OrderGateway> = paper.clone();
    let mut engine = LeggedArbEngine::new(settings, gateway);
    engine.set_expiry(Utc::now() + Duration::minutes(15));
    (engine, paper, fill_rx)
}

fn drain_fills(engine: &mut LeggedArbEngine, fills: &mut FillReceiver) -> usize {
    let mut applied = 0;
    while let Ok(fill) = fills.try_recv() {
        engine.handle_fill(fill).unwrap();
        applied += 1;
    }
    applied
}

#[tokio::test]
async fn test_full_cycle_neutral_to_locked() {
    let (mut engine, paper, mut fills) = paper_engine(EngineSettings::default());
    let now = Utc::now();

    // FISHER: both bids at 0.50 - 0.02.
    let outcome = engine.tick_at(now).await.unwrap();
    match outcome {
        TickOutcome::Fisher { yes_bid, no_bid } => {
            assert!((yes_bid - 0.48).abs() < 1e-9);
            assert!((no_bid - 0.48).abs() < 1e-9);
        }
        other => panic!("expected fisher, got {other:?}"),
    }
    assert_eq!(paper.open_orders(None).unwrap().len(), 2);

    // The NO bid gets hit.
    let no_id = engine.active_orders().get(Side::No).unwrap().to_string();
    assert!(paper.simulate_fill(&no_id, None).unwrap());
    assert_eq!(drain_fills(&mut engine, &mut fills), 1);
    assert_eq!(engine.phase(), Phase::LeggedNo);
    assert!(engine.active_orders().get(Side::No).is_none());

    // TRAPPER: YES ask 0.52 is above the 0.51 ceiling, so the hedge rests.
    let outcome = engine.tick_at(now + Duration::seconds(1)).await.unwrap();
    match outcome {
        TickOutcome::TrapperBid { side, price } => {
            assert_eq!(side, Side::Yes);
            assert!((price - 0.51).abs() < 1e-9);
        }
        other => panic!("expected resting hedge, got {other:?}"),
    }
    let yes_orders = paper.open_orders(Some(Side::Yes)).unwrap();
    assert_eq!(yes_orders.len(), 1, "old YES bid must be replaced");
    assert!((yes_orders[0].price - 0.51).abs() < 1e-9);

    // The ask drops inside the ceiling: cross the spread.
    paper.update_simulated_book(Side::Yes, 0.48, 0.50).unwrap();
    let outcome = engine.tick_at(now + Duration::seconds(2)).await.unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::TrapperCrossed { side: Side::Yes, .. }
    ));
    // The resting 0.51 hedge was pulled before the market buy, so only one
    // hedge fill arrives.
    assert!(paper.open_orders(Some(Side::Yes)).unwrap().is_empty());
    assert_eq!(drain_fills(&mut engine, &mut fills), 1);
    assert_eq!(engine.phase(), Phase::Locked);

    let summary = engine.state().summary();
    assert!((summary.yes_avg_cost - 0.50).abs() < 1e-9);
    assert!((summary.no_avg_cost - 0.48).abs() < 1e-9);
    assert!(summary.locked_profit > 0.0);
    assert_eq!(engine.risk().daily_trade_count(), 1);
    assert!(engine.risk().daily_pnl() > rust_decimal::Decimal::ZERO);

    // VAULT keeps the venue clear while waiting for settlement.
    let outcome = engine.tick_at(now + Duration::seconds(3)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Vault { .. }));
    assert!(paper.open_orders(None).unwrap().is_empty());
    assert_eq!(engine.phase(), Phase::Locked);
}

#[tokio::test]
async fn test_gamma_stop_near_expiry() {
    let (mut engine, paper, _fills) = paper_engine(EngineSettings::default());
    let now = Utc::now();
    engine.tick_at(now).await.unwrap();
    assert_eq!(paper.open_orders(None).unwrap().len(), 2);

    engine.set_expiry(now + Duration::seconds(60));
    let outcome = engine.tick_at(now).await.unwrap();
    match outcome {
        TickOutcome::SafetyStop { stop, report } => {
            assert!(matches!(stop, SafetyStop::GammaStop { .. }));
            assert_eq!(report.orders_cancelled, 2);
            assert_eq!(report.final_phase, Phase::Neutral);
            assert!(report.stranded.is_none());
        }
        other => panic!("expected gamma stop, got {other:?}"),
    }
    assert!(paper.open_orders(None).unwrap().is_empty());
    assert!(engine.last_emergency().is_some());
}

#[tokio::test]
async fn test_stop_loss_strands_leg() {
    let (mut engine, paper, _fills) = paper_engine(EngineSettings::default());
    // Bought YES well above the 0.50 fair value.
    engine
        .handle_fill(FillEvent::new(Side::Yes, 0.60, 10.0))
        .unwrap();

    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    match outcome {
        TickOutcome::SafetyStop { stop, report } => {
            assert!(matches!(stop, SafetyStop::StopLoss { side: Side::Yes, .. }));
            let stranded = report.stranded.unwrap();
            assert_eq!(stranded.side, Side::Yes);
            assert!((stranded.quantity - 10.0).abs() < 1e-9);
            assert!((stranded.cost_basis - 0.60).abs() < 1e-9);
        }
        other => panic!("expected stop loss, got {other:?}"),
    }
    assert_eq!(engine.phase(), Phase::Neutral);
    assert_eq!(engine.state().inventory().total_cost(), 0.0);
    assert!(paper.open_orders(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_position_timeout() {
    let (mut engine, _paper, _fills) = paper_engine(EngineSettings::default());
    let now = Utc::now();
    engine.set_expiry(now + Duration::hours(1));
    engine
        .handle_fill(FillEvent::new(Side::No, 0.48, 10.0))
        .unwrap();

    // First legged tick starts the clock.
    let outcome = engine.tick_at(now).await.unwrap();
    assert!(matches!(outcome, TickOutcome::TrapperBid { side: Side::Yes, .. }));

    let outcome = engine.tick_at(now + Duration::seconds(601)).await.unwrap();
    match outcome {
        TickOutcome::SafetyStop { stop, .. } => {
            assert!(matches!(stop, SafetyStop::PositionTimeout { .. }));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // The clock was cleared: a fresh leg gets a full allowance again.
    engine
        .handle_fill(FillEvent::new(Side::No, 0.48, 10.0))
        .unwrap();
    let outcome = engine.tick_at(now + Duration::seconds(602)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::TrapperBid { .. }));
}

#[tokio::test]
async fn test_trade_limit_halts_after_lock() {
    let settings = EngineSettings {
        risk: RiskConfig {
            max_daily_loss: 100.0,
            max_daily_trades: 1,
        },
        ..EngineSettings::default()
    };
    let (mut engine, _paper, _fills) = paper_engine(settings);
    engine
        .handle_fill(FillEvent::new(Side::Yes, 0.48, 10.0))
        .unwrap();
    engine
        .handle_fill(FillEvent::new(Side::No, 0.49, 10.0))
        .unwrap();
    assert_eq!(engine.phase(), Phase::Locked);

    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    match outcome {
        TickOutcome::RiskHalted(reason) => assert!(reason.contains("trade limit")),
        other => panic!("expected risk halt, got {other:?}"),
    }

    engine.reset_daily_limits();
    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Vault { .. }));
}

#[tokio::test]
async fn test_black_scholes_waits_for_spot() {
    let settings = EngineSettings {
        model: FairValueModel::BlackScholes {
            strike: 100_000.0,
            volatility: 0.6,
            risk_free_rate: 0.0,
        },
        ..EngineSettings::default()
    };
    let (mut engine, paper, _fills) = paper_engine(settings);

    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    assert_eq!(outcome, TickOutcome::NoFairValue);
    assert!(paper.open_orders(None).unwrap().is_empty());

    engine.on_price_update(PriceUpdate::new("BTCUSDT", 100_000.0, "test"));
    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    match outcome {
        TickOutcome::Fisher { yes_bid, no_bid } => {
            // At the money: both sides near 0.50 less the margin.
            assert!((yes_bid - 0.48).abs() < 0.02, "{yes_bid}");
            assert!((no_bid - 0.48).abs() < 0.02, "{no_bid}");
            assert!((yes_bid + no_bid - 0.96).abs() < 1e-9);
        }
        other => panic!("expected fisher, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gateway_errors_do_not_track_orders() {
    let mock = MockGateway::new();
    mock.set_error("venue down");
    let mut engine = LeggedArbEngine::new(EngineSettings::default(), Arc::new(mock.clone()));
    engine.set_expiry(Utc::now() + Duration::minutes(15));

    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Fisher { .. }));
    assert!(engine.active_orders().get(Side::Yes).is_none());
    assert!(engine.active_orders().get(Side::No).is_none());

    mock.clear_error();
    engine.tick_at(Utc::now()).await.unwrap();
    assert!(engine.active_orders().get(Side::Yes).is_some());
    assert!(engine.active_orders().get(Side::No).is_some());
    assert_eq!(mock.open_orders().len(), 2);
}

#[tokio::test]
async fn test_emergency_with_failing_gateway_still_resets() {
    let mock = MockGateway::new();
    let mut engine = LeggedArbEngine::new(EngineSettings::default(), Arc::new(mock.clone()));
    engine
        .handle_fill(FillEvent::new(Side::No, 0.45, 5.0))
        .unwrap();

    mock.set_error("venue down");
    let report = engine.emergency_stop("manual").await;
    assert_eq!(report.cancel_error.as_deref(), Some("venue down"));
    assert_eq!(report.stranded.map(|s| s.side), Some(Side::No));
    assert_eq!(engine.phase(), Phase::Neutral);
    assert_eq!(mock.calls().last(), Some(&Call::CancelAll));
}

#[tokio::test]
async fn test_trapper_crosses_with_held_quantity() {
    let mock = MockGateway::new();
    mock.set_book(Side::No, 0.40, 0.45);
    let mut engine = LeggedArbEngine::new(EngineSettings::default(), Arc::new(mock.clone()));
    engine.set_expiry(Utc::now() + Duration::minutes(15));
    engine
        .handle_fill(FillEvent::new(Side::Yes, 0.50, 12.5))
        .unwrap();

    let outcome = engine.tick_at(Utc::now()).await.unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::TrapperCrossed { side: Side::No, .. }
    ));
    assert!(mock.calls().contains(&Call::MarketBuy {
        side: Side::No,
        size: 12.5
    }));
}

#[tokio::test]
async fn test_run_loop_with_paper_fills() {
    let (fill_tx, fill_rx) = fill_channel();
    let paper = Arc::new(PaperGateway::new(fill_tx));
    // YES bids at 0.48 fill as soon as the poller sees them.
    paper.update_simulated_book(Side::Yes, 0.46, 0.48).unwrap();
    let gateway: Arc<dyn OrderGateway> = paper.clone();

    let (trigger, engine_shutdown) = shutdown::channel();
    let poller = spawn_fill_poller(
        Arc::clone(&gateway),
        std::time::Duration::from_millis(10),
        trigger.subscribe(),
    );

    let mut engine = LeggedArbEngine::new(EngineSettings::default(), gateway);
    engine.set_expiry(Utc::now() + Duration::minutes(15));
    let status = engine.subscribe_status();
    let (_price_tx, price_rx) = price_channel();

    let handle = tokio::spawn(async move {
        let result = engine
            .run(
                fill_rx,
                price_rx,
                engine_shutdown,
                std::time::Duration::from_millis(20),
            )
            .await;
        (engine, result)
    });

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    trigger.trigger();

    let (engine, result) = handle.await.unwrap();
    poller.await.unwrap();
    assert!(result.is_ok());

    // YES rested and filled, NO ask 0.50 was inside the 0.51 ceiling.
    assert_eq!(engine.phase(), Phase::Locked);
    assert_eq!(engine.risk().daily_trade_count(), 1);
    assert!(engine.tick_count() > 0);
    assert_eq!(status.borrow().phase, Phase::Locked);
    assert!(paper.open_orders(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_simulated_feed_drives_black_scholes() {
    let settings = EngineSettings {
        model: FairValueModel::BlackScholes {
            strike: 100_000.0,
            volatility: 0.6,
            risk_free_rate: 0.0,
        },
        ..EngineSettings::default()
    };
    let (mut engine, paper, fill_rx) = paper_engine(settings);
    let status = engine.subscribe_status();

    let (trigger, engine_shutdown) = shutdown::channel();
    let (price_tx, price_rx) = price_channel();
    let feed = SimulatedFeed::new("BTCUSDT", 100_000.0, 0.001, StdRng::seed_from_u64(42))
        .unwrap()
        .spawn(
            price_tx,
            std::time::Duration::from_millis(5),
            trigger.subscribe(),
        );

    let handle = tokio::spawn(async move {
        let result = engine
            .run(
                fill_rx,
                price_rx,
                engine_shutdown,
                std::time::Duration::from_millis(20),
            )
            .await;
        (engine, result)
    });

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    trigger.trigger();

    let (engine, result) = handle.await.unwrap();
    feed.await.unwrap();
    assert!(result.is_ok());

    let spot = engine.spot_price().unwrap();
    assert!((spot - 100_000.0).abs() < 5_000.0, "{spot}");
    assert_eq!(status.borrow().spot_price, Some(spot));
    // Near the money the bids stay below the 0.52/0.50 asks, so nothing fills.
    assert_eq!(engine.phase(), Phase::Neutral);
    assert!(engine.tick_count() > 0);
    assert!(paper.open_orders(None).unwrap().is_empty());
}
