//! Solver oracles which find the optimum of an assembled [`Problem`].
//!
//! Linear and mixed-integer problems are handed to HiGHS as they are. Problems with product-zero
//! rows cannot be, so they are solved by [`ComplementarityBranching`], which branches on which
//! factor of each product is zero and hands the resulting LPs to HiGHS.
use crate::formulation::problem::{LinearExpr, Problem, Sense};
use crate::log::LOG_LEVEL_ENV_VAR;
use crate::model::{EncodingKind, FormulationOptions};
use anyhow::{Context, Result, anyhow, ensure};
use highs::{HighsModelStatus, RowProblem};
use std::fmt;

pub mod branching;
pub use branching::ComplementarityBranching;

/// Relative MIP gap at which HiGHS stops, tight enough that the reported optimum is exact
const MIP_REL_GAP: f64 = 1e-9;

/// How far from 0 or 1 a binary may be, kept small so that big-M rows gate their sides cleanly
const MIP_FEASIBILITY_TOLERANCE: f64 = 1e-9;

/// The outcome of asking an oracle to solve a problem
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    /// An optimal solution was found
    Optimal {
        /// Value of the active objective
        objective: f64,
        /// Value of every column of the problem
        columns: Vec<f64>,
    },
    /// The problem has no feasible solution
    Infeasible,
    /// Any other solver status, verbatim
    Other(String),
}

impl OracleOutcome {
    /// A short description of the status
    pub fn status(&self) -> SolveStatus {
        match self {
            Self::Optimal { .. } => SolveStatus::Optimal,
            Self::Infeasible => SolveStatus::Infeasible,
            Self::Other(_) => SolveStatus::Other,
        }
    }
}

/// The status reported by a solver oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The solution is optimal
    Optimal,
    /// No feasible solution exists
    Infeasible,
    /// Anything else
    Other,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => write!(f, "optimal"),
            Self::Infeasible => write!(f, "infeasible"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Something which can find the optimum of an assembled problem
pub trait SolverOracle {
    /// The name of the oracle, for logging
    fn name(&self) -> &str;

    /// Solve the problem for its active objective.
    ///
    /// Errors are reserved for problems the oracle cannot handle at all; infeasibility and other
    /// solver statuses are reported through [`OracleOutcome`].
    fn solve(&self, problem: &Problem) -> Result<OracleOutcome>;
}

/// Solves linear and mixed-integer problems with HiGHS
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsOracle;

impl SolverOracle for HighsOracle {
    fn name(&self) -> &str {
        "HiGHS"
    }

    fn solve(&self, problem: &Problem) -> Result<OracleOutcome> {
        ensure!(
            problem.is_linear(),
            "HiGHS cannot solve problems with product-zero rows ({} present)",
            problem.bilinear_rows().len()
        );

        solve_with_highs(problem, &[])
    }
}

/// Choose the oracle for the encoding used in a formulation
pub fn oracle_for(options: &FormulationOptions) -> Box<dyn SolverOracle> {
    match options.encoding {
        EncodingKind::BigM => Box::new(HighsOracle),
        EncodingKind::Nonlinear => Box::new(ComplementarityBranching::new(
            options.complementarity_tolerance,
            options.max_branching_nodes,
        )),
    }
}

/// Solve the linear rows of a problem, plus rows fixing each expression in `fixed_zero` to zero.
///
/// Product-zero rows are ignored.
pub(crate) fn solve_with_highs(problem: &Problem, fixed_zero: &[&LinearExpr]) -> Result<OracleOutcome> {
    let (kind, objective) = problem
        .active_objective()
        .context("The problem has no objective")?;

    let mut costs = vec![0.0; problem.num_variables()];
    for &(var, coeff) in objective.expr.normalised().terms() {
        costs[var.index()] += coeff;
    }

    let mut highs_problem = RowProblem::default();
    let columns: Vec<_> = problem
        .iter_variables()
        .map(|var| {
            let cost = costs[var.index()];
            let (lower, upper) = problem.bounds(var);
            if problem.is_binary(var) {
                highs_problem.add_integer_column(cost, lower..=upper)
            } else {
                highs_problem.add_column(cost, lower..=upper)
            }
        })
        .collect();

    let to_terms = |expr: &LinearExpr| {
        expr.terms()
            .iter()
            .map(|&(var, coeff)| (columns[var.index()], coeff))
            .collect::<Vec<_>>()
    };

    for row in problem.rows() {
        highs_problem.add_row(row.lower..=row.upper, to_terms(&row.expr));
    }
    for expr in fixed_zero {
        let expr = expr.normalised();
        let rhs = -expr.constant_value();
        highs_problem.add_row(rhs..=rhs, to_terms(&expr));
    }

    let sense = match objective.sense {
        Sense::Minimise => highs::Sense::Minimise,
        Sense::Maximise => highs::Sense::Maximise,
    };
    let mut model = highs_problem.optimise(sense);
    enable_highs_logging(&mut model);
    if problem.has_binaries() {
        model.set_option("mip_rel_gap", MIP_REL_GAP);
        model.set_option("mip_feasibility_tolerance", MIP_FEASIBILITY_TOLERANCE);
    }

    let solved = model
        .try_solve()
        .map_err(|status| anyhow!("HiGHS rejected the {kind:?} problem: {status:?}"))?;
    let outcome = match solved.status() {
        HighsModelStatus::Optimal => OracleOutcome::Optimal {
            objective: solved.objective_value() + objective.expr.constant_value(),
            columns: solved.get_solution().columns().to_vec(),
        },
        HighsModelStatus::Infeasible => OracleOutcome::Infeasible,
        status => OracleOutcome::Other(format!("{status:?}")),
    };

    Ok(outcome)
}

/// Enable HiGHS console output when debugging
fn enable_highs_logging(model: &mut highs::Model) {
    // HiGHS writes straight to stdout rather than through our logger, so it would otherwise swamp
    // the output of every branching node
    let verbose = std::env::var(LOG_LEVEL_ENV_VAR).is_ok_and(|level| {
        level.eq_ignore_ascii_case("debug") || level.eq_ignore_ascii_case("trace")
    });
    if !verbose {
        return;
    }

    model.set_option("log_to_console", true);
    model.set_option("output_flag", true);
}
