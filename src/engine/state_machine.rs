//! Phase state machine.
//!
//! Owns the inventory ledger and the current phase. Every normal phase
//! change is checked against the adjacency table in [`Phase::successors`];
//! `force_neutral` is the only way around it.
//!
//! ```text
//! NEUTRAL ──YES fill──▶ LEGGED_YES ──NO fill──▶ LOCKED
//!    │  ◀───stop/reset───┘                        │
//!    └────NO fill──▶ LEGGED_NO ──YES fill──▶ LOCKED
//!       ◀───stop/reset───┘   ◀──settlement/reset──┘
//! ```

use serde::Serialize;
use tracing::{info, warn};

use super::ledger::Inventory;
use crate::types::{ArbError, Phase, Side};

/// Read-only snapshot for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateSummary {
    pub phase: Phase,
    pub yes_qty: f64,
    pub yes_avg_cost: f64,
    pub no_qty: f64,
    pub no_avg_cost: f64,
    pub total_cost: f64,
    pub locked_profit: f64,
    pub transitions: u64,
}

#[derive(Debug, Default)]
pub struct StateMachine {
    phase: Phase,
    inventory: Inventory,
    transition_count: u64,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn can_transition(&self, target: Phase) -> bool {
        self.phase.successors().contains(&target)
    }

    /// Apply a validated phase change.
    pub fn try_transition(&mut self, target: Phase, reason: &str) -> Result<(), ArbError> {
        if !self.can_transition(target) {
            return Err(ArbError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }

        let from = self.phase;
        self.phase = target;
        self.transition_count += 1;
        info!(from = %from, to = %target, reason, "Phase transition");
        Ok(())
    }

    /// Apply a phase change if the adjacency table allows it.
    ///
    /// A rejected change is logged and leaves the state untouched.
    pub fn transition(&mut self, target: Phase, reason: &str) -> bool {
        match self.try_transition(target, reason) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, reason, "Transition rejected");
                false
            }
        }
    }

    /// Record a fill and advance the phase.
    ///
    /// The ledger absorbs every fill whatever the phase; an unknown side label
    /// is rejected before anything is touched.
    pub fn on_fill(&mut self, side: &str, price: f64, qty: f64) -> Result<Phase, ArbError> {
        let side: Side = side.parse()?;
        self.inventory.side_mut(side).add(qty, price);

        let reason = format!("{side} filled {qty:.2}@{price:.4}");
        match (self.phase, side) {
            (Phase::Neutral, Side::Yes) => {
                self.transition(Phase::LeggedYes, &reason);
            }
            (Phase::Neutral, Side::No) => {
                self.transition(Phase::LeggedNo, &reason);
            }
            (Phase::LeggedYes, Side::No) | (Phase::LeggedNo, Side::Yes) => {
                self.transition(Phase::Locked, &reason);
            }
            // Same-side top-up while legged, or extra fills once locked.
            _ => {}
        }

        Ok(self.phase)
    }

    /// Reset to NEUTRAL and wipe the ledger, bypassing the adjacency table.
    pub fn force_neutral(&mut self, reason: &str) {
        warn!(from = %self.phase, reason, "Forcing NEUTRAL");
        self.phase = Phase::Neutral;
        self.inventory.reset();
    }

    pub fn summary(&self) -> StateSummary {
        let inv = &self.inventory;
        StateSummary {
            phase: self.phase,
            yes_qty: inv.yes.quantity,
            yes_avg_cost: inv.yes.avg_cost(),
            no_qty: inv.no.quantity,
            no_avg_cost: inv.no.avg_cost(),
            total_cost: inv.total_cost(),
            locked_profit: inv.locked_profit(),
            transitions: self.transition_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 4] = [Phase::Neutral, Phase::LeggedYes, Phase::LeggedNo, Phase::Locked];

    /// Drive a fresh machine into `phase` through valid fills.
    fn machine_in(phase: Phase) -> StateMachine {
        let mut sm = StateMachine::new();
        match phase {
            Phase::Neutral => {}
            Phase::LeggedYes => {
                sm.on_fill("YES", 0.48, 10.0).unwrap();
            }
            Phase::LeggedNo => {
                sm.on_fill("NO", 0.48, 10.0).unwrap();
            }
            Phase::Locked => {
                sm.on_fill("YES", 0.48, 10.0).unwrap();
                sm.on_fill("NO", 0.50, 10.0).unwrap();
            }
        }
        assert_eq!(sm.phase(), phase);
        sm
    }

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.phase(), Phase::Neutral);
        assert_eq!(sm.transition_count(), 0);
        assert_eq!(sm.inventory().total_cost(), 0.0);
    }

    #[test]
    fn test_transition_succeeds_iff_adjacent() {
        for from in ALL {
            for to in ALL {
                let mut sm = machine_in(from);
                let count = sm.transition_count();
                let allowed = from.successors().contains(&to);

                assert_eq!(sm.can_transition(to), allowed);
                assert_eq!(sm.transition(to, "test"), allowed, "{from} -> {to}");
                if allowed {
                    assert_eq!(sm.phase(), to);
                    assert_eq!(sm.transition_count(), count + 1);
                } else {
                    assert_eq!(sm.phase(), from);
                    assert_eq!(sm.transition_count(), count);
                }
            }
        }
    }

    #[test]
    fn test_try_transition_reports_invalid() {
        let mut sm = StateMachine::new();
        let err = sm.try_transition(Phase::Locked, "skip a leg").unwrap_err();
        assert_eq!(
            err,
            ArbError::InvalidTransition {
                from: Phase::Neutral,
                to: Phase::Locked
            }
        );
    }

    #[test]
    fn test_yes_then_no_locks() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.on_fill("YES", 0.48, 10.0).unwrap(), Phase::LeggedYes);
        assert_eq!(sm.on_fill("NO", 0.50, 10.0).unwrap(), Phase::Locked);
        assert!((sm.inventory().locked_profit() - 0.20).abs() < 1e-9);
        assert_eq!(sm.transition_count(), 2);
    }

    #[test]
    fn test_no_then_yes_locks() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.on_fill("NO", 0.45, 5.0).unwrap(), Phase::LeggedNo);
        assert_eq!(sm.on_fill("YES", 0.50, 5.0).unwrap(), Phase::Locked);
    }

    #[test]
    fn test_on_fill_accepts_lowercase_side() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.on_fill("yes", 0.48, 10.0).unwrap(), Phase::LeggedYes);
    }

    #[test]
    fn test_same_side_fill_while_legged_only_updates_ledger() {
        let mut sm = machine_in(Phase::LeggedYes);
        let phase = sm.on_fill("YES", 0.40, 10.0).unwrap();
        assert_eq!(phase, Phase::LeggedYes);
        assert_eq!(sm.inventory().yes.quantity, 20.0);
        assert!((sm.inventory().yes.avg_cost() - 0.44).abs() < 1e-9);
        assert_eq!(sm.transition_count(), 1);
    }

    #[test]
    fn test_fill_while_locked_stays_locked() {
        let mut sm = machine_in(Phase::Locked);
        assert_eq!(sm.on_fill("NO", 0.30, 5.0).unwrap(), Phase::Locked);
        assert_eq!(sm.inventory().no.quantity, 15.0);
    }

    #[test]
    fn test_invalid_side_is_error_and_untouched() {
        let mut sm = StateMachine::new();
        let err = sm.on_fill("MAYBE", 0.50, 10.0).unwrap_err();
        assert_eq!(err, ArbError::InvalidSide("MAYBE".into()));
        assert_eq!(sm.phase(), Phase::Neutral);
        assert_eq!(sm.inventory().total_cost(), 0.0);
    }

    #[test]
    fn test_force_neutral_from_any_phase() {
        for phase in ALL {
            let mut sm = machine_in(phase);
            sm.force_neutral("test reset");
            assert_eq!(sm.phase(), Phase::Neutral);
            assert_eq!(sm.inventory().yes.quantity, 0.0);
            assert_eq!(sm.inventory().no.quantity, 0.0);
        }
    }

    #[test]
    fn test_force_neutral_does_not_count_as_transition() {
        let mut sm = machine_in(Phase::LeggedNo);
        sm.force_neutral("stop loss");
        assert_eq!(sm.transition_count(), 1);
    }

    #[test]
    fn test_summary() {
        let sm = machine_in(Phase::Locked);
        let s = sm.summary();
        assert_eq!(s.phase, Phase::Locked);
        assert_eq!(s.yes_qty, 10.0);
        assert!((s.yes_avg_cost - 0.48).abs() < 1e-12);
        assert_eq!(s.no_qty, 10.0);
        assert!((s.no_avg_cost - 0.50).abs() < 1e-12);
        assert!((s.total_cost - 9.8).abs() < 1e-9);
        assert!((s.locked_profit - 0.20).abs() < 1e-9);
        assert_eq!(s.transitions, 2);
    }
}
