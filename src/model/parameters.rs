//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::input::{input_err_msg, read_toml};
use crate::units::{Energy, MoneyPerCapacity, MoneyPerCapacityPerYear, MoneyPerEnergy, Year};
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_big_m_safety_factor, f64, 10.0);
define_param_default!(default_complementarity_tolerance, f64, 1e-6);
define_param_default!(default_max_branching_nodes, u32, 100_000);

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Economic and technical inputs
    pub parameters: ParameterSet,
    /// Options controlling how the bilevel problem is reformulated
    #[serde(default)]
    pub formulation: FormulationOptions,
}

/// Economic and technical inputs shared by every part of the formulation.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ParameterSet {
    /// Lifetime of the installation in years
    pub lifetime: Year,
    /// Purchase price of PV per unit of capacity
    pub price_pv: MoneyPerCapacity,
    /// Purchase price of the battery per unit of capacity
    pub price_battery: MoneyPerCapacity,
    /// Cost of buying energy from the grid
    pub cost_buy: MoneyPerEnergy,
    /// Revenue from selling energy to the grid
    pub sell_price: MoneyPerEnergy,
    /// Scale factor converting the demand shape into absolute energy
    pub demand_total: Energy,
}

impl ParameterSet {
    /// Annualised cost of PV capacity
    pub fn cost_pv(&self) -> MoneyPerCapacityPerYear {
        self.price_pv / self.lifetime
    }

    /// Annualised cost of battery capacity
    pub fn cost_battery(&self) -> MoneyPerCapacityPerYear {
        self.price_battery / self.lifetime
    }

    /// Check that the parameters describe a bounded dispatch problem
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.lifetime.is_finite() && self.lifetime > Year(0.0),
            "lifetime must be a finite number greater than zero"
        );
        check_non_negative("price_pv", self.price_pv.value())?;
        check_non_negative("price_battery", self.price_battery.value())?;
        check_non_negative("cost_buy", self.cost_buy.value())?;
        check_non_negative("sell_price", self.sell_price.value())?;
        check_non_negative("demand_total", self.demand_total.value())?;

        // Otherwise buying and selling in the same period would make money
        ensure!(
            self.sell_price <= self.cost_buy,
            "sell_price ({}) cannot exceed cost_buy ({})",
            self.sell_price,
            self.cost_buy
        );

        Ok(())
    }
}

/// Check that a parameter is finite and not negative
fn check_non_negative(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// How complementary slackness is encoded in the single-level problem
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingKind {
    /// Fortuny-Amat linearisation with one binary indicator per complementarity pair
    #[default]
    #[string = "big_m"]
    BigM,
    /// Exact product-zero constraints, solved by branching on complementarity pairs
    #[string = "nonlinear"]
    Nonlinear,
}

/// Which objective is active in the assembled problem
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectiveKind {
    /// Minimise the lifetime cost of the installation and its operation
    #[default]
    #[string = "primal"]
    Primal,
    /// Maximise the value of the dual dispatch problem
    #[string = "dual"]
    Dual,
}

/// Options controlling how the bilevel problem is reformulated.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct FormulationOptions {
    /// Encoding used for complementary slackness
    #[serde(default)]
    pub encoding: EncodingKind,
    /// Explicit big-M constant, used for every complementarity pair.
    ///
    /// If absent, constants are derived from the parameters and time series.
    #[serde(default)]
    pub big_m: Option<f64>,
    /// Multiplier applied to the derived big-M bounds
    #[serde(default = "default_big_m_safety_factor")]
    pub big_m_safety_factor: f64,
    /// Tolerance used when checking complementarity and balance laws
    #[serde(default = "default_complementarity_tolerance")]
    pub complementarity_tolerance: f64,
    /// The maximum number of nodes explored when solving the nonlinear encoding exactly
    #[serde(default = "default_max_branching_nodes")]
    pub max_branching_nodes: u32,
    /// The active objective
    #[serde(default)]
    pub objective: ObjectiveKind,
}

impl Default for FormulationOptions {
    fn default() -> Self {
        Self {
            encoding: EncodingKind::default(),
            big_m: None,
            big_m_safety_factor: default_big_m_safety_factor(),
            complementarity_tolerance: default_complementarity_tolerance(),
            max_branching_nodes: default_max_branching_nodes(),
            objective: ObjectiveKind::default(),
        }
    }
}

impl FormulationOptions {
    /// Check the options are usable
    pub fn validate(&self) -> Result<()> {
        if let Some(big_m) = self.big_m {
            ensure!(
                big_m.is_finite() && big_m > 0.0,
                "big_m must be a finite number greater than zero"
            );
        }
        ensure!(
            self.big_m_safety_factor.is_finite() && self.big_m_safety_factor >= 1.0,
            "big_m_safety_factor must be a finite number of at least one"
        );
        ensure!(
            self.complementarity_tolerance.is_finite() && self.complementarity_tolerance > 0.0,
            "complementarity_tolerance must be a finite number greater than zero"
        );
        ensure!(
            self.max_branching_nodes > 0,
            "max_branching_nodes cannot be zero"
        );

        Ok(())
    }
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        self.formulation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::parameters;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_model_file(dir: &Path, contents: &str) {
        let mut file = File::create(dir.join(MODEL_PARAMETERS_FILE_NAME)).unwrap();
        writeln!(file, "{contents}").unwrap();
    }

    const PARAMETERS_TABLE: &str = "[parameters]
lifetime = 10
price_pv = 1000
price_battery = 300
cost_buy = 0.25
sell_price = 0.05
demand_total = 10";

    #[test]
    fn test_model_params_from_path() {
        let dir = tempdir().unwrap();
        write_model_file(dir.path(), PARAMETERS_TABLE);

        let model_params = ModelParameters::from_path(dir.path()).unwrap();
        assert_eq!(model_params.parameters.lifetime, Year(10.0));
        assert_eq!(model_params.formulation, FormulationOptions::default());
    }

    #[test]
    fn test_model_params_from_path_with_formulation() {
        let dir = tempdir().unwrap();
        write_model_file(
            dir.path(),
            &format!(
                "{PARAMETERS_TABLE}\n[formulation]\nencoding = \"nonlinear\"\nbig_m = 1e4\n\
                objective = \"dual\""
            ),
        );

        let options = ModelParameters::from_path(dir.path()).unwrap().formulation;
        assert_eq!(options.encoding, EncodingKind::Nonlinear);
        assert_eq!(options.big_m, Some(1e4));
        assert_eq!(options.objective, ObjectiveKind::Dual);
    }

    #[test]
    fn test_model_params_missing_parameter() {
        let dir = tempdir().unwrap();
        write_model_file(
            dir.path(),
            "[parameters]\nlifetime = 10\nprice_pv = 1000\nprice_battery = 300\ncost_buy = 0.25",
        );

        assert!(ModelParameters::from_path(dir.path()).is_err());
    }

    #[rstest]
    fn test_derived_costs(parameters: ParameterSet) {
        assert_approx_eq!(f64, parameters.cost_pv().value(), 100.0);
        assert_approx_eq!(f64, parameters.cost_battery().value(), 30.0);
    }

    #[rstest]
    fn test_validate_parameters(parameters: ParameterSet) {
        assert!(parameters.validate().is_ok());

        let bad = ParameterSet {
            lifetime: Year(0.0),
            ..parameters
        };
        assert!(bad.validate().is_err());

        let bad = ParameterSet {
            price_pv: MoneyPerCapacity(-1.0),
            ..parameters
        };
        assert!(bad.validate().is_err());

        let bad = ParameterSet {
            demand_total: Energy(f64::NAN),
            ..parameters
        };
        assert!(bad.validate().is_err());
    }

    #[rstest]
    fn test_validate_sell_price_above_cost_buy(parameters: ParameterSet) {
        let bad = ParameterSet {
            sell_price: MoneyPerEnergy(0.3),
            ..parameters
        };
        assert_eq!(
            bad.validate().unwrap_err().to_string(),
            "sell_price (0.3) cannot exceed cost_buy (0.25)"
        );
    }

    #[rstest]
    #[case(Some(1e6), 10.0, 1e-6, 100, true)]
    #[case(None, 1.0, 1e-9, 1, true)]
    #[case(Some(0.0), 10.0, 1e-6, 100, false)]
    #[case(Some(f64::INFINITY), 10.0, 1e-6, 100, false)]
    #[case(None, 0.5, 1e-6, 100, false)]
    #[case(None, 10.0, 0.0, 100, false)]
    #[case(None, 10.0, 1e-6, 0, false)]
    fn test_validate_options(
        #[case] big_m: Option<f64>,
        #[case] big_m_safety_factor: f64,
        #[case] complementarity_tolerance: f64,
        #[case] max_branching_nodes: u32,
        #[case] expected_valid: bool,
    ) {
        let options = FormulationOptions {
            big_m,
            big_m_safety_factor,
            complementarity_tolerance,
            max_branching_nodes,
            ..FormulationOptions::default()
        };
        assert_eq!(options.validate().is_ok(), expected_valid);
    }
}
