//! Dashboard API route handlers.
//!
//! All endpoints return JSON read from the latest published engine status.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::emergency::EmergencyReport;
use crate::engine::executor::ActiveOrders;
use crate::engine::EngineStatus;
use crate::strategy::risk::RiskStats;

/// Shared state accessible by all route handlers.
pub type AppState = watch::Receiver<EngineStatus>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PositionResponse {
    pub phase: String,
    pub yes_qty: f64,
    pub yes_avg_cost: f64,
    pub no_qty: f64,
    pub no_avg_cost: f64,
    pub total_cost: f64,
    pub locked_profit: f64,
    pub transitions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskResponse {
    pub can_trade: bool,
    #[serde(flatten)]
    pub stats: RiskStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub tick_count: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub spot_price: Option<f64>,
    pub expiry: Option<DateTime<Utc>>,
    pub seconds_to_expiry: Option<i64>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.borrow().clone())
}

/// GET /api/position
pub async fn get_position(State(state): State<AppState>) -> Json<PositionResponse> {
    let status = state.borrow();
    let p = &status.position;
    Json(PositionResponse {
        phase: status.phase.to_string(),
        yes_qty: p.yes_qty,
        yes_avg_cost: p.yes_avg_cost,
        no_qty: p.no_qty,
        no_avg_cost: p.no_avg_cost,
        total_cost: p.total_cost,
        locked_profit: p.locked_profit,
        transitions: p.transitions,
    })
}

/// GET /api/orders
pub async fn get_orders(State(state): State<AppState>) -> Json<ActiveOrders> {
    Json(state.borrow().active_orders.clone())
}

/// GET /api/risk
pub async fn get_risk(State(state): State<AppState>) -> Json<RiskResponse> {
    let stats = state.borrow().risk.clone();
    let within_loss = stats
        .max_daily_loss
        .map_or(true, |max_loss| stats.daily_pnl >= -max_loss);
    let can_trade = within_loss && stats.daily_trades < stats.max_daily_trades;
    Json(RiskResponse { can_trade, stats })
}

/// GET /api/heartbeat
pub async fn get_heartbeat(State(state): State<AppState>) -> Json<HeartbeatResponse> {
    let status = state.borrow();
    Json(HeartbeatResponse {
        tick_count: status.tick_count,
        last_tick: status.last_tick,
        spot_price: status.spot_price,
        expiry: status.expiry,
        seconds_to_expiry: status.expiry.map(|e| (e - Utc::now()).num_seconds()),
    })
}

/// GET /api/emergency
pub async fn get_last_emergency(
    State(state): State<AppState>,
) -> Result<Json<EmergencyReport>, StatusCode> {
    state
        .borrow()
        .last_emergency
        .clone()
        .map(Json)
        .ok_or(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
