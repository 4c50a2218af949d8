//! Assembly of the single-level reformulation of the PV and battery sizing problem.
//!
//! The lower-level dispatch LP is replaced by its KKT conditions: primal feasibility (the
//! [`primal`] block), dual feasibility (the [`dual`] block) and complementary slackness (the
//! [`complementarity`] block). Each block is built from the blocks before it, so the dual and
//! complementarity blocks cannot exist without the primal block they refer to.
use crate::model::{EncodingKind, Model, ObjectiveKind};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::{debug, warn};

pub mod big_m;
pub mod complementarity;
pub mod dual;
pub mod primal;
pub mod problem;

use big_m::BigM;
use complementarity::ComplementarityFamily;
use complementarity::{ComplementarityBlock, add_complementarity_block};
use dual::{DualBlock, add_dual_block};
use primal::{PrimalBlock, add_primal_block, demand_energy};
use problem::Problem;

/// The assembled single-level problem along with the blocks it was built from.
#[derive(Debug)]
pub struct Formulation {
    model: Model,
    problem: Problem,
    primal: PrimalBlock,
    dual: DualBlock,
    complementarity: ComplementarityBlock,
    big_m: Option<BigM>,
    delta: Vec<f64>,
}

impl Formulation {
    /// Build the single-level problem for a model.
    ///
    /// The demand perturbation starts at zero in every period. The active objective and the
    /// complementarity encoding are taken from the model's options.
    pub fn build(model: &Model) -> Result<Self> {
        let delta = vec![0.0; model.series.len()];
        let options = &model.options;

        let mut problem = Problem::default();
        let primal = add_primal_block(&mut problem, &model.parameters, &model.series, &delta)
            .context("Failed to build primal block")?;
        let dual = add_dual_block(&mut problem, &primal, &model.parameters, &model.series, &delta)
            .context("Failed to build dual block")?;

        let big_m = match options.encoding {
            EncodingKind::Nonlinear => None,
            EncodingKind::BigM => Some(options.big_m.map_or_else(
                || {
                    BigM::derive(
                        &model.parameters,
                        &model.series,
                        &delta,
                        options.big_m_safety_factor,
                    )
                },
                BigM::uniform,
            )),
        };
        let complementarity = add_complementarity_block(
            &mut problem,
            &primal,
            &dual,
            &model.parameters,
            &model.series,
            options.encoding,
            big_m.as_ref(),
        )
        .context("Failed to build complementarity block")?;
        problem.activate_objective(options.objective)?;

        debug!(
            "Built {:?} formulation with {} variables, {} linear rows and {} bilinear rows",
            options.encoding,
            problem.num_variables(),
            problem.rows().len(),
            problem.bilinear_rows().len()
        );

        let formulation = Self {
            model: model.clone(),
            problem,
            primal,
            dual,
            complementarity,
            big_m,
            delta,
        };
        formulation.warn_big_m_shortfalls();

        Ok(formulation)
    }

    /// The families whose big-M constants are smaller than the bounds derived for the current
    /// demand, without any safety factor.
    ///
    /// The optimum may be cut off for these families. This is always empty for the nonlinear
    /// encoding.
    pub fn big_m_shortfalls(&self) -> Vec<ComplementarityFamily> {
        let Some(big_m) = &self.big_m else {
            return Vec::new();
        };
        let required = BigM::derive(
            &self.model.parameters,
            &self.model.series,
            &self.delta,
            1.0,
        );

        big_m.shortfalls(&required).collect()
    }

    fn warn_big_m_shortfalls(&self) {
        let shortfalls = self.big_m_shortfalls();
        if !shortfalls.is_empty() {
            warn!(
                "The big-M constants for {} are smaller than the bounds derived from the inputs, \
                so the optimum may be cut off. Increase big_m, or remove it to derive the \
                constants.",
                shortfalls.iter().join(", ")
            );
        }
    }

    /// The model the formulation was built for
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The assembled problem
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The primal block
    pub fn primal(&self) -> &PrimalBlock {
        &self.primal
    }

    /// The dual block
    pub fn dual(&self) -> &DualBlock {
        &self.dual
    }

    /// The complementarity block
    pub fn complementarity(&self) -> &ComplementarityBlock {
        &self.complementarity
    }

    /// The big-M constants, if the big-M encoding was used
    pub fn big_m(&self) -> Option<&BigM> {
        self.big_m.as_ref()
    }

    /// The current demand perturbation in each period
    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    /// Absolute energy demand in each period, including the perturbation
    pub fn demand_energy(&self) -> Vec<f64> {
        demand_energy(&self.model.parameters, &self.model.series, &self.delta)
    }

    /// The active objective
    pub fn active_objective(&self) -> ObjectiveKind {
        self.problem
            .active_objective()
            .map_or(ObjectiveKind::Primal, |(kind, _)| kind)
    }

    /// Switch between the primal and dual objectives
    pub fn set_active_objective(&mut self, kind: ObjectiveKind) -> Result<()> {
        self.problem.activate_objective(kind)
    }

    /// Re-fix the demand perturbation for some periods.
    ///
    /// The right-hand sides of the nodal balance rows and the coefficients of the dual objective
    /// are updated in place, so the formulation can be solved again afterwards. Big-M constants
    /// are not re-derived; a warning is logged if they no longer cover the new demand.
    ///
    /// # Arguments
    ///
    /// * `values` - Pairs of period and new perturbation value
    pub fn set_demand_perturbation<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let values: Vec<_> = values.into_iter().collect();
        for &(period, value) in &values {
            ensure!(
                period < self.delta.len(),
                "Period {period} is out of range for a horizon of {} periods",
                self.delta.len()
            );
            ensure!(
                value.is_finite(),
                "Demand perturbation must be finite (period {period}: {value})"
            );
        }

        for (period, value) in values {
            self.delta[period] = value;
        }

        let demand = self.demand_energy();
        for ((row, &var), &demand) in self
            .primal
            .demand_rows
            .iter()
            .zip(&self.dual.dual_eq_demand)
            .zip(&demand)
        {
            self.problem.set_row_bounds(*row, demand, demand);
            self.problem
                .set_objective_coefficient(ObjectiveKind::Dual, var, demand)?;
        }

        self.warn_big_m_shortfalls();

        Ok(())
    }
}
