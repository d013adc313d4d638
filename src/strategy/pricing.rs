//! Fair-value and quote pricing.
//!
//! Black-Scholes pricing for a cash-or-nothing binary call, the fixed
//! 50/50 assumption for short direction-only windows, and the two quote
//! formulas the phase handlers use: inventory-skewed bids and the hedge
//! ceiling for the second leg.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ArbError, Side};

/// Lowest price an order may carry.
pub const MIN_PRICE: f64 = 0.01;
/// Highest price an order may carry.
pub const MAX_PRICE: f64 = 0.99;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0;

// ---------------------------------------------------------------------------
// Black-Scholes binary
// ---------------------------------------------------------------------------

/// Probability that `spot` finishes above `strike`.
///
/// d2 = (ln(S/K) + (r - σ²/2)·T) / (σ·√T), fair value = N(d2).
/// At or past expiry the outcome is deterministic.
pub fn binary_fair_value(
    spot: f64,
    strike: f64,
    time_to_expiry_years: f64,
    volatility: f64,
    risk_free_rate: f64,
) -> Result<f64, ArbError> {
    if time_to_expiry_years <= 0.0 {
        return Ok(if spot > strike { 1.0 } else { 0.0 });
    }
    if volatility <= 0.0 {
        return Err(ArbError::InvalidVolatility(volatility));
    }

    let t = time_to_expiry_years;
    let d2 = ((spot / strike).ln() + (risk_free_rate - 0.5 * volatility * volatility) * t)
        / (volatility * t.sqrt());
    Ok(norm_cdf(d2))
}

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Complementary error function (Chebyshev fit, |error| < 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let mut poly = 0.17087277;
    poly = poly * t - 0.82215223;
    poly = poly * t + 1.48851587;
    poly = poly * t - 1.13520398;
    poly = poly * t + 0.27886807;
    poly = poly * t - 0.18628806;
    poly = poly * t + 0.09678418;
    poly = poly * t + 0.37409196;
    poly = poly * t + 1.00002368;
    let ans = t * (-z * z - 1.26551223 + t * poly).exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Time remaining until `expiry`, in years, floored at zero.
pub fn years_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (expiry - now).num_milliseconds() as f64 / 1000.0;
    secs.max(0.0) / SECONDS_PER_YEAR
}

pub fn minutes_to_years(minutes: f64) -> f64 {
    minutes * 60.0 / SECONDS_PER_YEAR
}

// ---------------------------------------------------------------------------
// Fair-value model
// ---------------------------------------------------------------------------

/// Fair values for both sides. Always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FairValues {
    pub yes: f64,
    pub no: f64,
}

impl FairValues {
    pub fn from_yes(yes: f64) -> Self {
        Self { yes, no: 1.0 - yes }
    }

    pub fn side(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }
}

/// How the engine prices the pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FairValueModel {
    /// Constant YES probability; for short up/down windows where drift is noise.
    Fixed { yes: f64 },
    /// Closed-form binary call on the latest spot price.
    BlackScholes {
        strike: f64,
        volatility: f64,
        risk_free_rate: f64,
    },
}

impl Default for FairValueModel {
    fn default() -> Self {
        FairValueModel::Fixed { yes: 0.5 }
    }
}

impl FairValueModel {
    /// Price both sides.
    ///
    /// Returns `Ok(None)` when the model needs a spot price that has not
    /// arrived yet.
    pub fn fair_values(
        &self,
        spot: Option<f64>,
        time_to_expiry_years: f64,
    ) -> Result<Option<FairValues>, ArbError> {
        match *self {
            FairValueModel::Fixed { yes } => Ok(Some(FairValues::from_yes(yes))),
            FairValueModel::BlackScholes {
                strike,
                volatility,
                risk_free_rate,
            } => {
                let Some(spot) = spot else {
                    return Ok(None);
                };
                let yes = binary_fair_value(
                    spot,
                    strike,
                    time_to_expiry_years,
                    volatility,
                    risk_free_rate,
                )?;
                Ok(Some(FairValues::from_yes(yes)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Clamp to 0.01–0.99. NaN maps to the upper bound.
fn clamp_price(price: f64) -> f64 {
    if price.is_nan() {
        return MAX_PRICE;
    }
    price.clamp(MIN_PRICE, MAX_PRICE)
}

/// Inventory-adjusted bid: `fair_value - spread - inventory × risk_factor`.
///
/// Held inventory pushes the bid down, discouraging further accumulation.
pub fn skewed_bid(fair_value: f64, inventory_qty: f64, spread: f64, risk_factor: f64) -> f64 {
    clamp_price(fair_value - spread - inventory_qty * risk_factor)
}

/// Highest price payable for the opposite leg that still leaves `min_profit`.
pub fn hedge_price(cost_basis: f64, min_profit: f64) -> f64 {
    clamp_price(1.00 - cost_basis - min_profit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
