//! The dual of the dispatch LP.
//!
//! Each primal row has one dual variable. The limit rows are `<=` inequalities of a minimisation,
//! so their duals are non-positive; the balance rows are equalities, so their duals are free.
//! There is one dual feasibility row per primal variable.
use super::primal::{PrimalBlock, demand_energy};
use super::problem::{LinearExpr, Problem, ProblemId, Role, Sense, Variable};
use crate::model::{ObjectiveKind, ParameterSet};
use crate::series::TimeSeries;
use anyhow::{Result, ensure};

/// Dual variables of the dispatch LP.
#[derive(Debug, Clone, PartialEq)]
pub struct DualBlock {
    problem_id: ProblemId,
    /// Duals of the PV generation limits
    pub dual_limit_pv: Vec<Variable>,
    /// Duals of the state of charge limits
    pub dual_limit_battery: Vec<Variable>,
    /// Duals of the storage balance rows
    pub dual_eq_battery: Vec<Variable>,
    /// Duals of the nodal energy balance rows
    pub dual_eq_demand: Vec<Variable>,
}

impl DualBlock {
    /// The problem this block belongs to
    pub fn problem_id(&self) -> ProblemId {
        self.problem_id
    }
}

/// Add the dual LP's variables and feasibility rows to the problem.
///
/// The dual objective is defined but not activated.
///
/// # Arguments
///
/// * `problem` - The problem already containing `primal`
/// * `primal` - The primal block the duals refer to
/// * `parameters` - Economic inputs
/// * `series` - PV availability and demand
/// * `delta` - The demand perturbation in each period
pub fn add_dual_block(
    problem: &mut Problem,
    primal: &PrimalBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
    delta: &[f64],
) -> Result<DualBlock> {
    ensure!(
        primal.problem_id() == problem.id(),
        "The primal block was built for a different problem"
    );
    ensure!(
        primal.len() == series.len(),
        "The primal block has {} periods but the time series has {}",
        primal.len(),
        series.len()
    );

    let block = add_dual_variables(problem, series.len())?;
    add_dual_feasibility_constraints(problem, &block, parameters, series);

    // Keep whichever objective is already active
    let active = problem.active_objective().map(|(kind, _)| kind);
    problem.set_objective(
        ObjectiveKind::Dual,
        Sense::Maximise,
        &dual_objective(&block, &demand_energy(parameters, series, delta)),
    );
    if let Some(kind) = active {
        problem.activate_objective(kind)?;
    }

    Ok(block)
}

fn add_dual_variables(problem: &mut Problem, len: usize) -> Result<DualBlock> {
    let dual_limit_pv = problem.add_series("dual_limit_PV", Role::Dual, len, f64::NEG_INFINITY, 0.0)?;
    let dual_limit_battery =
        problem.add_series("dual_limit_battery", Role::Dual, len, f64::NEG_INFINITY, 0.0)?;
    let dual_eq_battery = problem.add_series(
        "dual_eq_battery",
        Role::Dual,
        len,
        f64::NEG_INFINITY,
        f64::INFINITY,
    )?;
    let dual_eq_demand = problem.add_series(
        "dual_eq_demand",
        Role::Dual,
        len,
        f64::NEG_INFINITY,
        f64::INFINITY,
    )?;

    Ok(DualBlock {
        problem_id: problem.id(),
        dual_limit_pv,
        dual_limit_battery,
        dual_eq_battery,
        dual_eq_demand,
    })
}

/// One row per primal variable: the duals of the rows it appears in, weighted by its
/// coefficients, cannot exceed its cost.
fn add_dual_feasibility_constraints(
    problem: &mut Problem,
    block: &DualBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
) {
    for t in series.iter_periods() {
        for (family, expr, rhs) in dual_feasibility_rows(block, parameters, series, t) {
            problem.add_le_row(Role::Dual, family, &expr, rhs);
        }
    }

    let capacity_battery = LinearExpr::default()
        .with_terms(block.dual_limit_battery.iter().map(|&var| (var, -1.0)));
    problem.add_le_row(
        Role::Dual,
        "capacity_battery",
        &capacity_battery,
        parameters.cost_battery().value(),
    );

    let capacity_pv = LinearExpr::default().with_terms(
        block
            .dual_limit_pv
            .iter()
            .zip(series.pv_availability())
            .map(|(&var, &availability)| (var, -availability)),
    );
    problem.add_le_row(
        Role::Dual,
        "capacity_PV",
        &capacity_pv,
        parameters.cost_pv().value(),
    );
}

/// The per-period dual feasibility rows as `(family, expr, rhs)` with `expr <= rhs`
fn dual_feasibility_rows(
    block: &DualBlock,
    parameters: &ParameterSet,
    series: &TimeSeries,
    t: usize,
) -> [(&'static str, LinearExpr, f64); 6] {
    let prev = series.previous(t);
    let y_demand = block.dual_eq_demand[t];
    let y_battery = block.dual_eq_battery[t];

    [
        (
            "energy_buy",
            LinearExpr::term(y_demand, 1.0),
            parameters.cost_buy.value(),
        ),
        (
            "energy_sell",
            LinearExpr::term(y_demand, -1.0),
            -parameters.sell_price.value(),
        ),
        (
            "energy_battery_out",
            LinearExpr::term(y_demand, 1.0).with_term(y_battery, -1.0),
            0.0,
        ),
        (
            "energy_battery_in",
            LinearExpr::term(y_demand, -1.0).with_term(y_battery, 1.0),
            0.0,
        ),
        // Stationarity of the state of charge in the previous period
        (
            "energy_battery",
            LinearExpr::term(y_battery, 1.0)
                .with_term(block.dual_eq_battery[prev], -1.0)
                .with_term(block.dual_limit_battery[prev], 1.0),
            0.0,
        ),
        (
            "energy_PV",
            LinearExpr::term(y_demand, 1.0).with_term(block.dual_limit_pv[t], 1.0),
            0.0,
        ),
    ]
}

/// The value of the demand served, at the dual price of energy
fn dual_objective(block: &DualBlock, demand: &[f64]) -> LinearExpr {
    LinearExpr::default().with_terms(block.dual_eq_demand.iter().copied().zip(demand.iter().copied()))
}
