//! Exact solution of problems with product-zero rows by branching on complementarity pairs.
//!
//! Each node of the search tree is an LP: the linear rows of the problem plus, for every product
//! branched on so far, a row fixing one of its factors to zero. Dropping the product rows can only
//! improve the objective, so each node's LP optimum bounds every node below it.
use super::{OracleOutcome, SolverOracle, solve_with_highs};
use crate::formulation::problem::{BilinearRow, LinearExpr, Problem, Sense};
use anyhow::{Context, Result};
use log::{debug, info};

/// Which factor of a product row is fixed to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Factor {
    Lhs,
    Rhs,
}

/// A factor fixed to zero at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fix {
    row: usize,
    factor: Factor,
}

impl Fix {
    fn expr(self, rows: &[BilinearRow]) -> &LinearExpr {
        let row = &rows[self.row];
        match self.factor {
            Factor::Lhs => &row.lhs,
            Factor::Rhs => &row.rhs,
        }
    }
}

/// The best solution found so far
struct Incumbent {
    objective: f64,
    columns: Vec<f64>,
}

/// Depth-first branch-and-bound over the product-zero rows of a problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplementarityBranching {
    tolerance: f64,
    max_nodes: u32,
}

impl ComplementarityBranching {
    /// Create a new oracle.
    ///
    /// # Arguments
    ///
    /// * `tolerance` - Largest product magnitude which counts as zero
    /// * `max_nodes` - The maximum number of LPs to solve before giving up
    pub fn new(tolerance: f64, max_nodes: u32) -> Self {
        Self {
            tolerance,
            max_nodes,
        }
    }

    /// Whether `objective` is better than the incumbent by more than the tolerance
    fn improves(&self, sense: Sense, objective: f64, incumbent: Option<&Incumbent>) -> bool {
        let Some(incumbent) = incumbent else {
            return true;
        };
        let margin = self.tolerance * incumbent.objective.abs().max(1.0);
        match sense {
            Sense::Minimise => objective < incumbent.objective - margin,
            Sense::Maximise => objective > incumbent.objective + margin,
        }
    }

    /// The unfixed product row with the largest violation, if any is violated
    fn most_violated(&self, rows: &[BilinearRow], fixes: &[Fix], columns: &[f64]) -> Option<usize> {
        rows.iter()
            .enumerate()
            .filter(|(index, _)| fixes.iter().all(|fix| fix.row != *index))
            .map(|(index, row)| (index, row.product(columns).abs()))
            .filter(|(_, violation)| *violation > self.tolerance)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
    }
}

impl SolverOracle for ComplementarityBranching {
    fn name(&self) -> &str {
        "complementarity branching"
    }

    fn solve(&self, problem: &Problem) -> Result<OracleOutcome> {
        let (_, objective) = problem
            .active_objective()
            .context("The problem has no objective")?;
        let sense = objective.sense;
        let rows = problem.bilinear_rows();

        let mut incumbent: Option<Incumbent> = None;
        let mut stack = vec![Vec::<Fix>::new()];
        let mut nodes = 0;
        while let Some(fixes) = stack.pop() {
            nodes += 1;
            if nodes > self.max_nodes {
                return Ok(OracleOutcome::Other(format!(
                    "Node limit of {} reached while branching on complementarity pairs",
                    self.max_nodes
                )));
            }

            let fixed: Vec<_> = fixes.iter().map(|fix| fix.expr(rows)).collect();
            let (objective, columns) = match solve_with_highs(problem, &fixed)? {
                OracleOutcome::Optimal { objective, columns } => (objective, columns),
                OracleOutcome::Infeasible => continue,
                // An unbounded relaxation does not mean the problem itself is unbounded, but we
                // cannot bound the subtree either
                other @ OracleOutcome::Other(_) => return Ok(other),
            };
            if !self.improves(sense, objective, incumbent.as_ref()) {
                continue;
            }

            let Some(row) = self.most_violated(rows, &fixes, &columns) else {
                debug!("New incumbent with objective {objective} after {nodes} nodes");
                incumbent = Some(Incumbent { objective, columns });
                continue;
            };

            // Explore fixing the factor closer to zero first
            let lhs = rows[row].lhs.evaluate(&columns).abs();
            let rhs = rows[row].rhs.evaluate(&columns).abs();
            let (first, second) = if lhs <= rhs {
                (Factor::Lhs, Factor::Rhs)
            } else {
                (Factor::Rhs, Factor::Lhs)
            };
            for factor in [second, first] {
                let mut child = fixes.clone();
                child.push(Fix { row, factor });
                stack.push(child);
            }
        }

        info!("Branching on complementarity pairs explored {nodes} nodes");
        Ok(match incumbent {
            Some(Incumbent { objective, columns }) => OracleOutcome::Optimal { objective, columns },
            None => OracleOutcome::Infeasible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::problem::Role;
    use crate::model::ObjectiveKind;
    use float_cmp::assert_approx_eq;

    /// max x + 2y subject to x, y in [0, 1] and x * y = 0
    fn product_problem() -> Problem {
        let mut problem = Problem::default();
        let x = problem.add_scalar("x", Role::Primal, 0.0, 1.0).unwrap();
        let y = problem.add_scalar("y", Role::Primal, 0.0, 1.0).unwrap();
        problem.set_objective(
            ObjectiveKind::Primal,
            Sense::Maximise,
            &LinearExpr::term(x, 1.0).with_term(y, 2.0),
        );
        problem.add_bilinear_row("xy", &LinearExpr::term(x, 1.0), &LinearExpr::term(y, 1.0));
        problem
    }

    #[test]
    fn test_branching_optimal() {
        let oracle = ComplementarityBranching::new(1e-9, 100);
        let OracleOutcome::Optimal { objective, columns } =
            oracle.solve(&product_problem()).unwrap()
        else {
            panic!("Expected optimal outcome")
        };

        assert_approx_eq!(f64, objective, 2.0, epsilon = 1e-7);
        assert_approx_eq!(f64, columns[0], 0.0, epsilon = 1e-7);
        assert_approx_eq!(f64, columns[1], 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_branching_infeasible() {
        let mut problem = product_problem();
        let x = problem.group("x").unwrap().variables()[0];
        let y = problem.group("y").unwrap().variables()[0];
        problem.add_row(Role::Primal, "x", &LinearExpr::term(x, 1.0), 0.5, 1.0);
        problem.add_row(Role::Primal, "y", &LinearExpr::term(y, 1.0), 0.5, 1.0);

        let oracle = ComplementarityBranching::new(1e-9, 100);
        assert_eq!(oracle.solve(&problem).unwrap(), OracleOutcome::Infeasible);
    }

    #[test]
    fn test_branching_node_limit() {
        let oracle = ComplementarityBranching::new(1e-9, 1);
        assert!(matches!(
            oracle.solve(&product_problem()).unwrap(),
            OracleOutcome::Other(_)
        ));
    }
}
