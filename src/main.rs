//! Legged arbitrage engine entry point.
//!
//! Loads configuration, initialises structured logging, wires the paper
//! gateway, fill poller and optional dashboard to the engine, and runs the
//! tick loop until Ctrl+C or SIGTERM.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use legged_arb::config::AppConfig;
use legged_arb::dashboard;
use legged_arb::engine::LeggedArbEngine;
use legged_arb::feed::{price_channel, SimulatedFeed};
use legged_arb::gateway::paper::PaperGateway;
use legged_arb::gateway::{fill_channel, spawn_fill_poller, OrderGateway};
use legged_arb::shutdown;

const CONFIG_PATH: &str = "config.toml";

const BANNER: &str = r#"
 _                            _
| |    ___  __ _  __ _  ___  __| |   __ _ _ __ ___
| |   / _ \/ _` |/ _` |/ _ \/ _` |  / _` | '__/ _ \
| |__|  __/ (_| | (_| |  __/ (_| | | (_| | | | |_) |
|_____\___|\__, |\__, |\___|\__,_|  \__,_|_| |_.__/
           |___/ |___/

  YES/NO binary legging engine
  v0.1.0 (paper trading)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_present = Path::new(CONFIG_PATH).exists();
    let cfg = if config_present {
        AppConfig::load(CONFIG_PATH)?
    } else {
        AppConfig::default()
    };

    init_logging();

    println!("{BANNER}");
    if !config_present {
        warn!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        symbol = %cfg.engine.symbol,
        model = ?cfg.engine.fair_value_model,
        tick_ms = cfg.engine.tick_interval_ms,
        session_minutes = cfg.engine.session_minutes,
        "Legged arb starting up"
    );

    // -- Wiring -------------------------------------------------------------

    let (fill_tx, fill_rx) = fill_channel();
    let (price_tx, price_rx) = price_channel();

    let gateway: Arc<dyn OrderGateway> = Arc::new(PaperGateway::new(fill_tx));
    info!(gateway = gateway.name(), "Order gateway ready");

    let (trigger, engine_shutdown) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_shutdown(trigger.clone()));

    // With the feed off the sender is held idle so the channel stays open.
    let (feed, _idle_price_tx) = if cfg.feed.simulated {
        let rng = match cfg.feed.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let feed = SimulatedFeed::new(
            cfg.engine.symbol.to_lowercase(),
            cfg.feed.base_price,
            cfg.feed.volatility,
            rng,
        )?;
        let handle = feed.spawn(price_tx, cfg.feed.tick_interval(), trigger.subscribe());
        (Some(handle), None)
    } else {
        warn!("Simulated feed disabled, Black-Scholes pricing will wait for spot");
        (None, Some(price_tx))
    };

    let poller = spawn_fill_poller(
        Arc::clone(&gateway),
        cfg.engine.fill_poll_interval(),
        trigger.subscribe(),
    );

    let mut engine = LeggedArbEngine::new(cfg.engine_settings(), gateway);
    engine.set_expiry(Utc::now() + ChronoDuration::minutes(cfg.engine.session_minutes));

    let dashboard = if cfg.dashboard.enabled {
        Some(
            dashboard::spawn_dashboard(
                engine.subscribe_status(),
                cfg.dashboard.port,
                trigger.subscribe(),
            )
            .await?,
        )
    } else {
        None
    };

    // -- Main loop ----------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");
    let result = engine
        .run(fill_rx, price_rx, engine_shutdown, cfg.engine.tick_interval())
        .await;

    // Stop background tasks whether the engine ended cleanly or not.
    trigger.trigger();
    if let Err(e) = poller.await {
        warn!(error = %e, "Fill poller task failed");
    }
    if let Some(handle) = feed {
        if let Err(e) = handle.await {
            warn!(error = %e, "Price feed task failed");
        }
    }
    if let Some(handle) = dashboard {
        if let Err(e) = handle.await {
            warn!(error = %e, "Dashboard task failed");
        }
    }

    let status = engine.status();
    match &result {
        Ok(()) => info!(
            phase = %status.phase,
            ticks = status.tick_count,
            daily_pnl = %status.risk.daily_pnl.round_dp(4),
            trades = status.risk.daily_trades,
            "Legged arb shut down cleanly."
        ),
        Err(e) => error!(error = %e, phase = %status.phase, "Legged arb stopped on error"),
    }

    result
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `LEGGED_ARB_LOG_JSON` switches to
/// JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("legged_arb=info"));

    let json_logging = std::env::var("LEGGED_ARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
