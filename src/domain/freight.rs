//! Freight cost model and duty calculator.
//!
//! Shipping cost is a base charge plus a per-kg rate scaled by a
//! distance-normalized multiplier. This is a benchmark approximation,
//! not a live freight quote.

use serde::Serialize;

use super::distance::route_distance;
use super::entities::{CostError, Mode};

/// Mid-range normalization constant; typical intercontinental routes
/// land at a factor of roughly 1.0–4.0.
pub const DISTANCE_NORM_KM: f64 = 5_000.0;

pub struct ShippingRates {
    pub base_charge: f64,
    pub per_kg_rate: f64,
}

const AIR_RATES: ShippingRates = ShippingRates {
    base_charge: 250.0,
    per_kg_rate: 6.0,
};

const SEA_RATES: ShippingRates = ShippingRates {
    base_charge: 120.0,
    per_kg_rate: 1.2,
};

pub fn shipping_rates(mode: Mode) -> &'static ShippingRates {
    match mode {
        Mode::Air => &AIR_RATES,
        Mode::Sea => &SEA_RATES,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShippingQuote {
    pub distance_km: u32,
    pub distance_factor: f64,
    pub shipping_cost: f64,
}

/// Calculate freight shipping cost for a route.
///
/// Rounding happens at each step (factor, then cost) so the intermediate
/// figures match what ends up in the final breakdown.
pub fn calculate_shipping_cost(
    origin: &str,
    destination: &str,
    mode: Mode,
    weight_kg: f64,
) -> Result<ShippingQuote, CostError> {
    let distance_km = route_distance(origin, destination, mode)?;
    let distance_factor = round2(distance_km as f64 / DISTANCE_NORM_KM);

    let rates = shipping_rates(mode);
    let shipping_cost = round2(rates.base_charge + weight_kg * rates.per_kg_rate * distance_factor);

    Ok(ShippingQuote {
        distance_km,
        distance_factor,
        shipping_cost,
    })
}

/// `import_duty = product_value × tariff_rate / 100`.
///
/// The rate is a percentage, not a fraction. Negative rates are rejected
/// here; clamping post-shock rates to zero is the shock module's job.
pub fn calculate_import_duty(product_value: f64, tariff_rate: f64) -> Result<f64, CostError> {
    if tariff_rate < 0.0 {
        return Err(CostError::InvalidTariffRate { rate: tariff_rate });
    }
    Ok(round2(product_value * tariff_rate / 100.0))
}
