//! Solving an assembled formulation and extracting the results.
use crate::formulation::Formulation;
use crate::model::ObjectiveKind;
use crate::solver::{OracleOutcome, SolverOracle};
use crate::units::Capacity;
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use log::info;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// A solve which did not produce an optimal solution
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// No valid sizing and dispatch exists for these inputs
    Infeasible,
    /// The solver reported some other status, verbatim
    Unclassified(String),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infeasible => write!(
                f,
                "The problem is infeasible: no valid sizing and dispatch exists for these inputs"
            ),
            Self::Unclassified(status) => write!(f, "Unclassified solver failure: {status}"),
        }
    }
}

impl Error for SolveError {}

/// The value of a variable group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// A group with a single variable
    Scalar(f64),
    /// A group with one variable per period
    Series(Vec<f64>),
}

impl VariableValue {
    /// The value as a scalar, if it is one
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Series(_) => None,
        }
    }

    /// The values as a series, if it is one
    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            Self::Scalar(_) => None,
            Self::Series(values) => Some(values),
        }
    }
}

/// The optimal solution of a formulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    objective: f64,
    objective_kind: ObjectiveKind,
    variables: IndexMap<String, VariableValue>,
    columns: Vec<f64>,
    capacity_pv: Capacity,
    capacity_battery: Capacity,
}

impl Solution {
    /// Group the column values of a formulation's problem by variable group
    fn from_columns(formulation: &Formulation, objective: f64, columns: Vec<f64>) -> Result<Self> {
        let problem = formulation.problem();
        let objective_kind = problem
            .active_objective()
            .context("The problem has no objective")?
            .0;
        if columns.len() != problem.num_variables() {
            bail!(
                "The solver returned {} values for a problem with {} variables",
                columns.len(),
                problem.num_variables()
            );
        }

        let variables = problem
            .iter_groups()
            .map(|group| {
                let value = if group.is_series() {
                    VariableValue::Series(
                        group.variables().iter().map(|var| columns[var.index()]).collect(),
                    )
                } else {
                    VariableValue::Scalar(columns[group.variables()[0].index()])
                };
                (group.name().to_string(), value)
            })
            .collect();

        let primal = formulation.primal();
        let capacity_pv = Capacity(columns[primal.capacity_pv.index()]);
        let capacity_battery = Capacity(columns[primal.capacity_battery.index()]);

        Ok(Self {
            objective,
            objective_kind,
            variables,
            columns,
            capacity_pv,
            capacity_battery,
        })
    }

    /// Value of the active objective
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Which objective was active
    pub fn objective_kind(&self) -> ObjectiveKind {
        self.objective_kind
    }

    /// Every variable group's value, in the order the groups were declared
    pub fn variables(&self) -> &IndexMap<String, VariableValue> {
        &self.variables
    }

    /// Look up a variable group's value by name
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    /// Look up a per-period variable group by name
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.get(name)?.as_series()
    }

    /// Look up a scalar variable by name
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_scalar()
    }

    /// Installed PV capacity
    pub fn capacity_pv(&self) -> Capacity {
        self.capacity_pv
    }

    /// Installed battery capacity
    pub fn capacity_battery(&self) -> Capacity {
        self.capacity_battery
    }

    /// The raw value of every column, indexed by [`Variable::index`]
    ///
    /// [`Variable::index`]: crate::formulation::problem::Variable::index
    pub fn columns(&self) -> &[f64] {
        &self.columns
    }
}

/// Solve a formulation with the given oracle.
///
/// An infeasible problem or an unexpected solver status is returned as a [`SolveError`] inside
/// the [`anyhow::Error`], so callers can tell these apart from a badly formed problem with
/// `downcast_ref`.
pub fn solve(formulation: &Formulation, oracle: &dyn SolverOracle) -> Result<Solution> {
    let problem = formulation.problem();
    info!(
        "Solving {:?} formulation with {} ({} variables)",
        formulation.complementarity().encoding(),
        oracle.name(),
        problem.num_variables()
    );

    match oracle.solve(problem)? {
        OracleOutcome::Optimal { objective, columns } => {
            let solution = Solution::from_columns(formulation, objective, columns)?;
            info!("Optimal {:?} objective: {objective}", formulation.active_objective());
            Ok(solution)
        }
        OracleOutcome::Infeasible => Err(SolveError::Infeasible.into()),
        OracleOutcome::Other(status) => Err(SolveError::Unclassified(status).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model;
    use crate::formulation::problem::Problem;
    use crate::model::Model;
    use crate::solver::HighsOracle;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    struct FixedOracle(OracleOutcome);

    impl SolverOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        fn solve(&self, _problem: &Problem) -> Result<OracleOutcome> {
            Ok(self.0.clone())
        }
    }

    #[rstest]
    fn test_solve_extracts_groups(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let solution = solve(&formulation, &HighsOracle).unwrap();

        assert_approx_eq!(f64, solution.objective(), 5.0, epsilon = 1e-5);
        assert_eq!(solution.objective_kind(), ObjectiveKind::Primal);
        assert_eq!(solution.variables().len(), 8 + 4 + 10);
        assert_eq!(solution.variables().keys().next().unwrap(), "energy_PV");
        assert_eq!(solution.series("energy_buy").unwrap().len(), 3);
        assert!(solution.scalar("energy_buy").is_none());
        assert!(solution.scalar("binary_capacity_PV").is_some());
        assert_approx_eq!(f64, solution.capacity_pv().value(), 0.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_capacities_read_from_primal_columns(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let primal = formulation.primal();
        let mut columns = vec![0.0; formulation.problem().num_variables()];
        columns[primal.capacity_pv.index()] = 3.0;
        columns[primal.capacity_battery.index()] = 2.0;
        let outcome = OracleOutcome::Optimal {
            objective: 0.0,
            columns,
        };
        let solution = solve(&formulation, &FixedOracle(outcome)).unwrap();

        assert_eq!(solution.capacity_pv(), Capacity(3.0));
        assert_eq!(solution.capacity_battery(), Capacity(2.0));
        assert_eq!(solution.scalar("capacity_PV"), Some(3.0));
    }

    #[rstest]
    fn test_solve_infeasible(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let error = solve(&formulation, &FixedOracle(OracleOutcome::Infeasible)).unwrap_err();
        assert_eq!(error.downcast_ref::<SolveError>(), Some(&SolveError::Infeasible));
    }

    #[rstest]
    fn test_solve_unclassified(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let outcome = OracleOutcome::Other("Unbounded".into());
        let error = solve(&formulation, &FixedOracle(outcome)).unwrap_err();
        assert_eq!(
            error.downcast_ref::<SolveError>(),
            Some(&SolveError::Unclassified("Unbounded".into()))
        );
        assert_eq!(error.to_string(), "Unclassified solver failure: Unbounded");
    }

    #[rstest]
    fn test_solve_wrong_column_count(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let outcome = OracleOutcome::Optimal {
            objective: 0.0,
            columns: vec![0.0],
        };
        let error = solve(&formulation, &FixedOracle(outcome)).unwrap_err();
        assert!(error.downcast_ref::<SolveError>().is_none());
    }
}
