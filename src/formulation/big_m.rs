//! Constants for the big-M (Fortuny-Amat) encoding of complementary slackness.
//!
//! The encoding only recovers the bilevel optimum if each constant is at least as large as the
//! side of the pair it gates can be at some optimal KKT point. Constants are therefore derived
//! per family from the cost parameters and the demand, then multiplied by a safety factor. After
//! solving, a gated side within tolerance of its constant is reported by the diagnostics.
//!
//! With `E` the total absolute energy demand and `a` the smallest nonzero PV availability:
//!
//! * PV capacity beyond `E / a` covers all demand in every period and only earns sales, which
//!   cannot pay for it, so PV flows and slacks are bounded by `E / a`. Battery capacity, state of
//!   charge and battery flows are bounded by `E`. Purchases can serve demand and charge the
//!   battery, so are bounded by `2E`; sales by `E / a + 2E`.
//! * The price of energy lies between `sell_price` and `cost_buy`, and the battery dual equals it,
//!   so the purchase and sale residuals are bounded by the spread and the charge and discharge
//!   residuals are zero. The capacity rows bound each PV limit dual by `cost_pv / a` (or by the
//!   price of energy where there is no availability) and each battery limit dual by
//!   `cost_battery`.
use super::complementarity::ComplementarityFamily;
use crate::model::ParameterSet;
use crate::series::TimeSeries;
use indexmap::IndexMap;
use serde::Serialize;
use strum::IntoEnumIterator;

/// Smallest constant used for either side, so that no row degenerates to a fixed zero
const MIN_BOUND: f64 = 1.0;

/// The constants gating the two sides of one complementarity family
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SideBounds {
    /// Bound on the primal variable or primal row slack
    pub primal: f64,
    /// Bound on the dual variable or dual row residual
    pub dual: f64,
}

impl SideBounds {
    /// Whether both constants are at least those in `required`
    pub fn covers(&self, required: &SideBounds) -> bool {
        self.primal >= required.primal && self.dual >= required.dual
    }
}

/// Big-M constants for every complementarity family
#[derive(Debug, Clone, PartialEq)]
pub struct BigM {
    bounds: IndexMap<ComplementarityFamily, SideBounds>,
}

impl BigM {
    /// Use the same constant for both sides of every family
    pub fn uniform(value: f64) -> Self {
        let side = SideBounds {
            primal: value,
            dual: value,
        };
        Self {
            bounds: ComplementarityFamily::iter().map(|family| (family, side)).collect(),
        }
    }

    /// Derive constants for each family from the model inputs.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Economic inputs
    /// * `series` - PV availability and demand
    /// * `delta` - The demand perturbation in each period
    /// * `safety_factor` - Multiplier applied to every derived bound
    pub fn derive(
        parameters: &ParameterSet,
        series: &TimeSeries,
        delta: &[f64],
        safety_factor: f64,
    ) -> Self {
        // Without any PV availability, PV capacity is never built and the divisor is irrelevant
        let min_availability = series.min_nonzero_availability().unwrap_or(1.0);
        let energy = total_energy(parameters, series, delta);
        let pv_energy = energy / min_availability;

        let cost_buy = parameters.cost_buy.value();
        let cost_pv = parameters.cost_pv().value();
        let cost_battery = parameters.cost_battery().value();
        let spread = cost_buy - parameters.sell_price.value();
        let pv_limit_dual = (cost_pv / min_availability).max(cost_buy);

        let bounds = ComplementarityFamily::iter()
            .map(|family| {
                let (primal, dual) = match family {
                    ComplementarityFamily::LimitPv | ComplementarityFamily::EnergyPv => {
                        (pv_energy, pv_limit_dual)
                    }
                    ComplementarityFamily::LimitBattery => (energy, cost_battery),
                    ComplementarityFamily::EnergyBattery => (energy, cost_battery + spread),
                    ComplementarityFamily::EnergyBuy => (2.0 * energy, spread),
                    ComplementarityFamily::EnergySell => (pv_energy + 2.0 * energy, spread),
                    ComplementarityFamily::EnergyBatteryOut
                    | ComplementarityFamily::EnergyBatteryIn => (energy, 0.0),
                    ComplementarityFamily::CapacityBattery => (energy, cost_battery),
                    ComplementarityFamily::CapacityPv => (pv_energy, cost_pv),
                };
                let side = SideBounds {
                    primal: safety_factor * primal.max(MIN_BOUND),
                    dual: safety_factor * dual.max(MIN_BOUND),
                };
                (family, side)
            })
            .collect();

        Self { bounds }
    }

    /// The constants for a family
    pub fn get(&self, family: ComplementarityFamily) -> SideBounds {
        self.bounds[&family]
    }

    /// Iterate over the constants for every family
    pub fn iter(&self) -> impl Iterator<Item = (ComplementarityFamily, SideBounds)> + '_ {
        self.bounds.iter().map(|(family, side)| (*family, *side))
    }

    /// The families whose constants are smaller than those in `required`
    pub fn shortfalls<'a>(
        &'a self,
        required: &'a BigM,
    ) -> impl Iterator<Item = ComplementarityFamily> + 'a {
        self.iter()
            .filter(|(family, side)| !side.covers(&required.get(*family)))
            .map(|(family, _)| family)
    }
}

/// Total absolute energy demand over the horizon
pub fn total_energy(parameters: &ParameterSet, series: &TimeSeries, delta: &[f64]) -> f64 {
    parameters.demand_total.value()
        * series
            .demand()
            .iter()
            .zip(delta)
            .map(|(demand, delta)| (demand + delta).abs())
            .sum::<f64>()
}
