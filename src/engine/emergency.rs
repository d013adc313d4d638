//! Emergency exit.
//!
//! Cancels everything, notes any one-sided position left behind, and resets
//! the state machine to NEUTRAL. Each step runs even if an earlier one
//! failed. A stranded leg is reported, never liquidated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::executor::Executor;
use super::state_machine::StateMachine;
use crate::types::{Phase, Side};

/// A leg held without its hedge when the engine bailed out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrandedPosition {
    pub side: Side,
    pub quantity: f64,
    pub cost_basis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyReport {
    pub reason: String,
    pub orders_cancelled: usize,
    /// Set when the cancel-all sweep failed.
    pub cancel_error: Option<String>,
    pub stranded: Option<StrandedPosition>,
    pub initial_phase: Phase,
    pub final_phase: Phase,
    pub timestamp: DateTime<Utc>,
}

/// Run the exit procedure and return what it did.
pub async fn emergency_exit(
    executor: &mut Executor,
    state: &mut StateMachine,
    reason: &str,
) -> EmergencyReport {
    error!(reason, phase = %state.phase(), "EMERGENCY EXIT");
    let initial_phase = state.phase();

    let (orders_cancelled, cancel_error) = match executor.cancel_all().await {
        Ok(count) => (count, None),
        Err(e) => {
            error!(error = %e, "Failed to cancel orders during emergency exit");
            (0, Some(e.to_string()))
        }
    };

    let stranded = initial_phase.held_side().and_then(|side| {
        let position = state.inventory().side(side);
        (!position.is_flat()).then(|| StrandedPosition {
            side,
            quantity: position.quantity,
            cost_basis: position.avg_cost(),
        })
    });
    if let Some(s) = &stranded {
        warn!(
            side = %s.side,
            qty = format!("{:.2}", s.quantity),
            cost_basis = format!("{:.4}", s.cost_basis),
            "Stranded position"
        );
    }

    state.force_neutral(reason);

    let report = EmergencyReport {
        reason: reason.to_string(),
        orders_cancelled,
        cancel_error,
        stranded,
        initial_phase,
        final_phase: state.phase(),
        timestamp: Utc::now(),
    };
    info!(
        cancelled = report.orders_cancelled,
        stranded = report.stranded.is_some(),
        from = %report.initial_phase,
        to = %report.final_phase,
        "Emergency exit complete"
    );
    report
}
