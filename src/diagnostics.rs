//! Post-solve checks of a solution against the laws any KKT point must satisfy.
use crate::formulation::Formulation;
use crate::formulation::problem::Variable;
use crate::model::ObjectiveKind;
use crate::solution::Solution;
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

/// Which side of a complementarity pair a big-M constant gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The primal variable or primal row slack
    #[strum(serialize = "primal")]
    Primal,
    /// The dual variable or dual row residual
    #[strum(serialize = "dual")]
    Dual,
}

/// A gated side which reached its big-M constant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingBigM {
    /// Complementarity family
    pub family: String,
    /// Period, for per-period families
    pub period: Option<usize>,
    /// Which side reached the constant
    pub side: Side,
    /// Value of the side
    pub value: f64,
    /// The constant
    pub big_m: f64,
}

/// Results of checking a solution.
///
/// Residuals are absolute and are reported as the worst case over all periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Tolerance the checks were made against
    pub tolerance: f64,
    /// Largest violation of the nodal energy balance
    pub balance_residual: f64,
    /// Largest violation of the cyclic storage balance
    pub storage_residual: f64,
    /// Value of the primal objective
    pub primal_objective: f64,
    /// Value of the dual objective
    pub dual_objective: f64,
    /// Absolute difference between the primal and dual objectives
    pub duality_gap: f64,
    /// For each complementarity family, the largest value of the smaller side over all pairs
    pub complementarity: IndexMap<String, f64>,
    /// Gated sides which reached their big-M constant
    pub binding_big_m: Vec<BindingBigM>,
}

impl Diagnostics {
    /// Check a solution of the given formulation.
    ///
    /// # Arguments
    ///
    /// * `formulation` - The formulation which was solved
    /// * `solution` - Its solution
    /// * `tolerance` - Relative tolerance for the checks
    pub fn evaluate(formulation: &Formulation, solution: &Solution, tolerance: f64) -> Self {
        let columns = solution.columns();
        let primal = formulation.primal();
        let series = &formulation.model().series;
        let value = |var: Variable| columns[var.index()];

        let balance_residual = formulation
            .demand_energy()
            .iter()
            .enumerate()
            .map(|(t, demand)| {
                let supply = value(primal.energy_buy[t]) + value(primal.energy_battery_out[t])
                    - value(primal.energy_battery_in[t])
                    + value(primal.energy_pv[t])
                    - value(primal.energy_sell[t]);
                (supply - demand).abs()
            })
            .fold(0.0, f64::max);

        let storage_residual = series
            .iter_periods()
            .map(|t| {
                let expected = value(primal.energy_battery[series.previous(t)])
                    - value(primal.energy_battery_out[t])
                    + value(primal.energy_battery_in[t]);
                (value(primal.energy_battery[t]) - expected).abs()
            })
            .fold(0.0, f64::max);

        let problem = formulation.problem();
        let objective_value = |kind| {
            problem
                .objective(kind)
                .map_or(f64::NAN, |objective| objective.expr.evaluate(columns))
        };
        let primal_objective = objective_value(ObjectiveKind::Primal);
        let dual_objective = objective_value(ObjectiveKind::Dual);

        let mut complementarity: IndexMap<String, f64> = IndexMap::new();
        for pair in formulation.complementarity().iter_pairs() {
            let smaller = pair
                .primal_side
                .evaluate(columns)
                .abs()
                .min(pair.dual_side.evaluate(columns).abs());
            let worst = complementarity.entry(pair.family.to_string()).or_insert(0.0);
            *worst = worst.max(smaller);
        }

        let mut binding_big_m = Vec::new();
        if let Some(big_m) = formulation.big_m() {
            for (pair, _) in formulation.complementarity().iter_indicators() {
                let bounds = big_m.get(pair.family);
                for (side, expr, m) in [
                    (Side::Primal, &pair.primal_side, bounds.primal),
                    (Side::Dual, &pair.dual_side, bounds.dual),
                ] {
                    let value = expr.evaluate(columns);
                    if value >= m - tolerance * m.abs().max(1.0) {
                        binding_big_m.push(BindingBigM {
                            family: pair.family.to_string(),
                            period: pair.period,
                            side,
                            value,
                            big_m: m,
                        });
                    }
                }
            }
        }

        Self {
            tolerance,
            balance_residual,
            storage_residual,
            primal_objective,
            dual_objective,
            duality_gap: (primal_objective - dual_objective).abs(),
            complementarity,
            binding_big_m,
        }
    }

    /// Whether `value` is zero to within tolerance, relative to `scale`
    fn is_negligible(&self, value: f64, scale: f64) -> bool {
        value <= self.tolerance * scale.abs().max(1.0)
    }

    /// Whether the nodal and storage balances hold
    pub fn balances_hold(&self) -> bool {
        self.is_negligible(self.balance_residual, 1.0)
            && self.is_negligible(self.storage_residual, 1.0)
    }

    /// Whether the primal and dual objectives agree
    pub fn strong_duality_holds(&self) -> bool {
        self.is_negligible(self.duality_gap, self.primal_objective)
    }

    /// The complementarity families with a pair where neither side is zero
    pub fn violated_families(&self) -> impl Iterator<Item = (&str, f64)> {
        self.complementarity
            .iter()
            .filter(|(_, worst)| !self.is_negligible(**worst, 1.0))
            .map(|(family, worst)| (family.as_str(), *worst))
    }

    /// Whether every check passed
    pub fn all_hold(&self) -> bool {
        self.balances_hold()
            && self.strong_duality_holds()
            && self.violated_families().next().is_none()
            && self.binding_big_m.is_empty()
    }

    /// Log a warning for each check which failed
    pub fn log_warnings(&self) {
        if !self.balances_hold() {
            warn!(
                "Balance laws violated: nodal residual {}, storage residual {}",
                self.balance_residual, self.storage_residual
            );
        }
        if !self.strong_duality_holds() {
            warn!(
                "Primal objective ({}) and dual objective ({}) differ by {}",
                self.primal_objective, self.dual_objective, self.duality_gap
            );
        }
        for (family, worst) in self.violated_families() {
            warn!("Complementary slackness violated for {family} (smaller side: {worst})");
        }
        for binding in &self.binding_big_m {
            warn!(
                "The {} side of {} (period {:?}) reached its big-M constant of {}. The constant \
                may be too small; consider increasing big_m or big_m_safety_factor.",
                binding.side, binding.family, binding.period, binding.big_m
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{model, parameters, time_series};
    use crate::formulation::complementarity::ComplementarityFamily;
    use crate::model::{FormulationOptions, Model, ParameterSet};
    use crate::series::TimeSeries;
    use crate::units::MoneyPerCapacity;
    use crate::solution::solve;
    use crate::solver::HighsOracle;
    use float_cmp::assert_approx_eq;
    use itertools::Itertools;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn test_diagnostics_hold(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let solution = solve(&formulation, &HighsOracle).unwrap();
        let diagnostics = Diagnostics::evaluate(&formulation, &solution, 1e-6);

        assert!(diagnostics.all_hold(), "{diagnostics:?}");
        assert_approx_eq!(f64, diagnostics.dual_objective, 5.0, epsilon = 1e-5);
        assert_eq!(
            diagnostics.complementarity.keys().cloned().collect_vec(),
            ComplementarityFamily::iter()
                .map(|family| family.to_string())
                .collect_vec()
        );
    }

    #[rstest]
    fn test_binding_big_m_detected(parameters: ParameterSet, time_series: TimeSeries) {
        // Grid purchases of 10 in periods 0 and 2 exactly reach the constant
        let parameters = ParameterSet {
            price_pv: MoneyPerCapacity(50.0),
            price_battery: MoneyPerCapacity(50.0),
            ..parameters
        };
        let options = FormulationOptions {
            big_m: Some(10.0),
            ..FormulationOptions::default()
        };
        let model = Model::new(parameters, options, time_series).unwrap();
        let formulation = Formulation::build(&model).unwrap();
        let solution = solve(&formulation, &HighsOracle).unwrap();
        let diagnostics = Diagnostics::evaluate(&formulation, &solution, 1e-6);

        assert!(diagnostics.binding_big_m.iter().any(|binding| {
            binding.family == "energy_buy" && binding.period == Some(0) && binding.side == Side::Primal
        }));
        assert!(diagnostics.balances_hold());
        assert!(!diagnostics.all_hold());
    }
}
