//! The hourly dispatch LP for a household PV and battery installation.
use super::problem::{LinearExpr, Problem, ProblemId, Role, RowId, Sense, Variable};
use crate::model::{ObjectiveKind, ParameterSet};
use crate::series::TimeSeries;
use anyhow::Result;

/// Variables and balance rows of the dispatch LP.
///
/// This can only be created by [`add_primal_block`], so holding one proves that the primal
/// variables exist in a particular [`Problem`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrimalBlock {
    problem_id: ProblemId,
    /// PV generation used in each period
    pub energy_pv: Vec<Variable>,
    /// Battery state of charge at the end of each period
    pub energy_battery: Vec<Variable>,
    /// Energy charged into the battery in each period
    pub energy_battery_in: Vec<Variable>,
    /// Energy discharged from the battery in each period
    pub energy_battery_out: Vec<Variable>,
    /// Energy bought from the grid in each period
    pub energy_buy: Vec<Variable>,
    /// Energy sold to the grid in each period
    pub energy_sell: Vec<Variable>,
    /// Installed PV capacity
    pub capacity_pv: Variable,
    /// Installed battery capacity
    pub capacity_battery: Variable,
    /// The nodal energy balance row for each period
    pub(super) demand_rows: Vec<RowId>,
}

impl PrimalBlock {
    /// The problem this block belongs to
    pub fn problem_id(&self) -> ProblemId {
        self.problem_id
    }

    /// The number of periods covered by the block
    pub fn len(&self) -> usize {
        self.energy_pv.len()
    }

    /// Whether the block covers no periods (never true for a validated series)
    pub fn is_empty(&self) -> bool {
        self.energy_pv.is_empty()
    }
}

/// Absolute energy demand in each period, including the perturbation term
pub fn demand_energy(parameters: &ParameterSet, series: &TimeSeries, delta: &[f64]) -> Vec<f64> {
    series
        .demand()
        .iter()
        .zip(delta)
        .map(|(demand, delta)| parameters.demand_total.value() * (demand + delta))
        .collect()
}

/// Add the dispatch LP's variables, constraints and objective to the problem.
///
/// # Arguments
///
/// * `problem` - The problem to add to
/// * `parameters` - Economic inputs
/// * `series` - PV availability and demand
/// * `delta` - The demand perturbation in each period
///
/// # Returns
///
/// The [`PrimalBlock`] referring to the new variables.
pub fn add_primal_block(
    problem: &mut Problem,
    parameters: &ParameterSet,
    series: &TimeSeries,
    delta: &[f64],
) -> Result<PrimalBlock> {
    let mut block = add_primal_variables(problem, series.len())?;
    add_capacity_limit_constraints(problem, &block, series);
    add_storage_balance_constraints(problem, &block, series);
    block.demand_rows =
        add_demand_balance_constraints(problem, &block, &demand_energy(parameters, series, delta));
    problem.set_objective(
        ObjectiveKind::Primal,
        Sense::Minimise,
        &primal_objective(&block, parameters),
    );

    Ok(block)
}

fn add_primal_variables(problem: &mut Problem, len: usize) -> Result<PrimalBlock> {
    let mut add_flow = |name| problem.add_series(name, Role::Primal, len, 0.0, f64::INFINITY);
    let energy_pv = add_flow("energy_PV")?;
    let energy_battery = add_flow("energy_battery")?;
    let energy_battery_in = add_flow("energy_battery_in")?;
    let energy_battery_out = add_flow("energy_battery_out")?;
    let energy_buy = add_flow("energy_buy")?;
    let energy_sell = add_flow("energy_sell")?;
    let capacity_pv = problem.add_scalar("capacity_PV", Role::Primal, 0.0, f64::INFINITY)?;
    let capacity_battery =
        problem.add_scalar("capacity_battery", Role::Primal, 0.0, f64::INFINITY)?;

    Ok(PrimalBlock {
        problem_id: problem.id(),
        energy_pv,
        energy_battery,
        energy_battery_in,
        energy_battery_out,
        energy_buy,
        energy_sell,
        capacity_pv,
        capacity_battery,
        demand_rows: Vec::new(),
    })
}

/// PV generation and state of charge cannot exceed what the installed capacity allows
fn add_capacity_limit_constraints(problem: &mut Problem, block: &PrimalBlock, series: &TimeSeries) {
    for t in series.iter_periods() {
        let expr = LinearExpr::term(block.energy_pv[t], 1.0)
            .with_term(block.capacity_pv, -series.pv_availability()[t]);
        problem.add_le_row(Role::Primal, "limit_PV", &expr, 0.0);
    }

    for t in series.iter_periods() {
        let expr = LinearExpr::term(block.energy_battery[t], 1.0)
            .with_term(block.capacity_battery, -1.0);
        problem.add_le_row(Role::Primal, "limit_battery", &expr, 0.0);
    }
}

/// The state of charge carries over from the previous period, wrapping round the horizon.
///
/// Rows are written as `e[t-1] - e[t] - out[t] + in[t] = 0` so that their duals enter the
/// stationarity conditions with the signs used by the dual block.
fn add_storage_balance_constraints(problem: &mut Problem, block: &PrimalBlock, series: &TimeSeries) {
    for t in series.iter_periods() {
        let expr = LinearExpr::term(block.energy_battery[series.previous(t)], 1.0)
            .with_term(block.energy_battery[t], -1.0)
            .with_term(block.energy_battery_out[t], -1.0)
            .with_term(block.energy_battery_in[t], 1.0);
        problem.add_eq_row(Role::Primal, "eq_battery", &expr, 0.0);
    }
}

/// Supply must meet demand in every period
fn add_demand_balance_constraints(
    problem: &mut Problem,
    block: &PrimalBlock,
    demand: &[f64],
) -> Vec<RowId> {
    demand
        .iter()
        .enumerate()
        .map(|(t, &demand)| {
            let expr = LinearExpr::term(block.energy_buy[t], 1.0)
                .with_term(block.energy_battery_out[t], 1.0)
                .with_term(block.energy_battery_in[t], -1.0)
                .with_term(block.energy_pv[t], 1.0)
                .with_term(block.energy_sell[t], -1.0);
            problem.add_eq_row(Role::Primal, "eq_demand", &expr, demand)
        })
        .collect()
}

/// Annualised capacity costs plus the net cost of trading with the grid
fn primal_objective(block: &PrimalBlock, parameters: &ParameterSet) -> LinearExpr {
    let cost_buy = parameters.cost_buy.value();
    let sell_price = parameters.sell_price.value();

    LinearExpr::term(block.capacity_pv, parameters.cost_pv().value())
        .with_term(block.capacity_battery, parameters.cost_battery().value())
        .with_terms(block.energy_buy.iter().map(|&var| (var, cost_buy)))
        .with_terms(block.energy_sell.iter().map(|&var| (var, -sell_price)))
}
