//! Complementary slackness between the dispatch LP and its dual.
//!
//! Every pair consists of a primal side (a primal variable or the slack of a primal row) and a
//! dual side (a dual variable or the residual of a dual row). Both sides are non-negative at any
//! primal and dual feasible point, and at least one must be zero for the point to be optimal.
use super::big_m::BigM;
use super::dual::DualBlock;
use super::primal::PrimalBlock;
use super::problem::{LinearExpr, Problem, Role, Variable};
use crate::model::{EncodingKind, ParameterSet};
use crate::series::TimeSeries;
use anyhow::{Context, Result, ensure};
use strum::IntoEnumIterator;

/// A family of complementarity pairs, one per primal row family or primal variable group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum ComplementarityFamily {
    /// PV generation limit and its dual
    #[strum(serialize = "limit_PV")]
    LimitPv,
    /// State of charge limit and its dual
    #[strum(serialize = "limit_battery")]
    LimitBattery,
    /// Grid purchases and their dual feasibility row
    #[strum(serialize = "energy_buy")]
    EnergyBuy,
    /// Grid sales and their dual feasibility row
    #[strum(serialize = "energy_sell")]
    EnergySell,
    /// Battery discharge and its dual feasibility row
    #[strum(serialize = "energy_battery_out")]
    EnergyBatteryOut,
    /// Battery charge and its dual feasibility row
    #[strum(serialize = "energy_battery_in")]
    EnergyBatteryIn,
    /// State of charge and its dual feasibility row
    #[strum(serialize = "energy_battery")]
    EnergyBattery,
    /// PV generation and its dual feasibility row
    #[strum(serialize = "energy_PV")]
    EnergyPv,
    /// Battery capacity and its dual feasibility row
    #[strum(serialize = "capacity_battery")]
    CapacityBattery,
    /// PV capacity and its dual feasibility row
    #[strum(serialize = "capacity_PV")]
    CapacityPv,
}

impl ComplementarityFamily {
    /// Whether the family has one pair per period (otherwise it has a single pair)
    pub fn is_per_period(self) -> bool {
        !matches!(self, Self::CapacityBattery | Self::CapacityPv)
    }

    /// Name of the group of indicator variables for the big-M encoding
    pub fn indicator_name(self) -> String {
        format!("binary_{self}")
    }
}

/// A single complementarity pair
#[derive(Debug, Clone, PartialEq)]
pub struct ComplementarityPair {
    /// The family the pair belongs to
    pub family: ComplementarityFamily,
    /// The period, for per-period families
    pub period: Option<usize>,
    /// A primal variable or primal row slack
    pub primal_side: LinearExpr,
    /// A dual variable or dual row residual
    pub dual_side: LinearExpr,
}

impl ComplementarityPair {
    /// The product of the two sides for the given column values
    pub fn product(&self, values: &[f64]) -> f64 {
        self.primal_side.evaluate(values) * self.dual_side.evaluate(values)
    }
}

/// The complementarity pairs and how they were encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplementarityBlock {
    encoding: EncodingKind,
    pairs: Vec<ComplementarityPair>,
    /// Indicator variable for each pair (big-M encoding only)
    indicators: Vec<Variable>,
}

impl ComplementarityBlock {
    /// The encoding used
    pub fn encoding(&self) -> EncodingKind {
        self.encoding
    }

    /// Iterate over every pair
    pub fn iter_pairs(&self) -> impl Iterator<Item = &ComplementarityPair> {
        self.pairs.iter()
    }

    /// Iterate over every pair with its indicator variable.
    ///
    /// This is empty unless the big-M encoding was used.
    pub fn iter_indicators(&self) -> impl Iterator<Item = (&ComplementarityPair, Variable)> {
        self.pairs.iter().zip(self.indicators.iter().copied())
    }
}

/// Build every complementarity pair between the primal and dual blocks.
///
/// Pairs are returned family by family, in period order.
pub fn complementarity_pairs(
    primal: &PrimalBlock,
    dual: &DualBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
) -> Vec<ComplementarityPair> {
    ComplementarityFamily::iter()
        .flat_map(|family| family_pairs(family, primal, dual, parameters, series))
        .collect()
}

/// Build the pairs of one family
fn family_pairs(
    family: ComplementarityFamily,
    primal: &PrimalBlock,
    dual: &DualBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
) -> Vec<ComplementarityPair> {
    let y_demand = &dual.dual_eq_demand;
    let y_battery = &dual.dual_eq_battery;

    match family {
        ComplementarityFamily::LimitPv => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.capacity_pv, series.pv_availability()[t])
                    .with_term(primal.energy_pv[t], -1.0),
                LinearExpr::term(dual.dual_limit_pv[t], -1.0),
            )
        }),
        ComplementarityFamily::LimitBattery => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.capacity_battery, 1.0)
                    .with_term(primal.energy_battery[t], -1.0),
                LinearExpr::term(dual.dual_limit_battery[t], -1.0),
            )
        }),
        ComplementarityFamily::EnergyBuy => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.energy_buy[t], 1.0),
                LinearExpr::term(y_demand[t], -1.0).with_constant(parameters.cost_buy.value()),
            )
        }),
        ComplementarityFamily::EnergySell => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.energy_sell[t], 1.0),
                LinearExpr::term(y_demand[t], 1.0).with_constant(-parameters.sell_price.value()),
            )
        }),
        ComplementarityFamily::EnergyBatteryOut => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.energy_battery_out[t], 1.0),
                LinearExpr::term(y_battery[t], 1.0).with_term(y_demand[t], -1.0),
            )
        }),
        ComplementarityFamily::EnergyBatteryIn => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.energy_battery_in[t], 1.0),
                LinearExpr::term(y_demand[t], 1.0).with_term(y_battery[t], -1.0),
            )
        }),
        ComplementarityFamily::EnergyBattery => per_period(family, series, |t| {
            let prev = series.previous(t);
            (
                LinearExpr::term(primal.energy_battery[prev], 1.0),
                LinearExpr::term(y_battery[t], -1.0)
                    .with_term(y_battery[prev], 1.0)
                    .with_term(dual.dual_limit_battery[prev], -1.0),
            )
        }),
        ComplementarityFamily::EnergyPv => per_period(family, series, |t| {
            (
                LinearExpr::term(primal.energy_pv[t], 1.0),
                LinearExpr::term(y_demand[t], -1.0).with_term(dual.dual_limit_pv[t], -1.0),
            )
        }),
        ComplementarityFamily::CapacityBattery => vec![ComplementarityPair {
            family,
            period: None,
            primal_side: LinearExpr::term(primal.capacity_battery, 1.0),
            dual_side: LinearExpr::constant(parameters.cost_battery().value())
                .with_terms(dual.dual_limit_battery.iter().map(|&var| (var, 1.0))),
        }],
        ComplementarityFamily::CapacityPv => vec![ComplementarityPair {
            family,
            period: None,
            primal_side: LinearExpr::term(primal.capacity_pv, 1.0),
            dual_side: LinearExpr::constant(parameters.cost_pv().value()).with_terms(
                dual.dual_limit_pv
                    .iter()
                    .copied()
                    .zip(series.pv_availability().iter().copied()),
            ),
        }],
    }
}

/// One pair per period, with sides given by `sides`
fn per_period<F>(
    family: ComplementarityFamily,
    series: &TimeSeries,
    sides: F,
) -> Vec<ComplementarityPair>
where
    F: Fn(usize) -> (LinearExpr, LinearExpr),
{
    series
        .iter_periods()
        .map(|t| {
            let (primal_side, dual_side) = sides(t);
            ComplementarityPair {
                family,
                period: Some(t),
                primal_side,
                dual_side,
            }
        })
        .collect()
}

/// Add complementary slackness rows to the problem using the requested encoding.
///
/// # Arguments
///
/// * `problem` - The problem already containing `primal` and `dual`
/// * `primal` - The primal block
/// * `dual` - The dual block
/// * `parameters` - Economic inputs
/// * `series` - PV availability and demand
/// * `encoding` - How to encode the pairs
/// * `big_m` - Constants for the big-M encoding (required for that encoding only)
pub fn add_complementarity_block(
    problem: &mut Problem,
    primal: &PrimalBlock,
    dual: &DualBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
    encoding: EncodingKind,
    big_m: Option<&BigM>,
) -> Result<ComplementarityBlock> {
    ensure!(
        primal.problem_id() == problem.id() && dual.problem_id() == problem.id(),
        "The primal and dual blocks must be built for the same problem"
    );

    let pairs = complementarity_pairs(primal, dual, parameters, series);
    let indicators = match encoding {
        EncodingKind::Nonlinear => {
            for pair in &pairs {
                problem.add_bilinear_row(
                    &pair.family.to_string(),
                    &pair.primal_side,
                    &pair.dual_side,
                );
            }
            Vec::new()
        }
        EncodingKind::BigM => {
            let big_m = big_m.context("The big-M encoding requires big-M constants")?;
            add_big_m_rows(problem, &pairs, series.len(), big_m)?
        }
    };

    Ok(ComplementarityBlock {
        encoding,
        pairs,
        indicators,
    })
}

/// Add one indicator per pair along with the rows
/// `primal_side <= M * b` and `dual_side <= M * (1 - b)`.
fn add_big_m_rows(
    problem: &mut Problem,
    pairs: &[ComplementarityPair],
    len: usize,
    big_m: &BigM,
) -> Result<Vec<Variable>> {
    let mut indicators = Vec::with_capacity(pairs.len());
    for family in ComplementarityFamily::iter() {
        let name = family.indicator_name();
        if family.is_per_period() {
            indicators.extend(problem.add_binary_series(&name, Role::BigM, len)?);
        } else {
            indicators.push(problem.add_binary_scalar(&name, Role::BigM)?);
        }
    }

    // Pairs and indicators are both ordered by family then period
    for (pair, &indicator) in pairs.iter().zip(&indicators) {
        let family = pair.family.to_string();
        let m = big_m.get(pair.family);

        let primal_row = pair.primal_side.clone().with_term(indicator, -m.primal);
        problem.add_le_row(Role::BigM, &family, &primal_row, 0.0);

        let dual_row = pair.dual_side.clone().with_term(indicator, m.dual);
        problem.add_le_row(Role::BigM, &family, &dual_row, m.dual);
    }

    Ok(indicators)
}
