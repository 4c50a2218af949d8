//! The module responsible for writing output data to disk.
use crate::diagnostics::Diagnostics;
use crate::formulation::Formulation;
use crate::formulation::problem::Variable;
use crate::solution::Solution;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "pvkkt_results";

/// The output file name for the sizing summary
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// The output file name for the dispatch
const DISPATCH_FILE_NAME: &str = "dispatch.csv";

/// The output file name for dual values
const DUALS_FILE_NAME: &str = "duals.csv";

/// The output file name for diagnostics
const DIAGNOSTICS_FILE_NAME: &str = "diagnostics.toml";

/// Get the output directory for the model in the specified directory
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory, returning whether existing output will be overwritten.
///
/// An existing non-empty directory is only reused if `allow_overwrite` is set.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        let is_empty = output_dir.read_dir()?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace its \
            contents."
        );
        fs::remove_dir_all(output_dir)?;
        fs::create_dir_all(output_dir)?;
        return Ok(true);
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// The sizing decision and its cost
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Summary {
    /// Which objective was optimised
    objective_kind: String,
    /// Value of the objective
    objective: f64,
    /// Installed PV capacity
    capacity_pv: f64,
    /// Installed battery capacity
    capacity_battery: f64,
    /// Annualised cost of a unit of PV capacity
    cost_pv: f64,
    /// Annualised cost of a unit of battery capacity
    cost_battery: f64,
    /// Annualised capital cost of the installation
    capex_per_year: f64,
}

impl Summary {
    fn new(formulation: &Formulation, solution: &Solution) -> Self {
        let parameters = &formulation.model().parameters;
        let capacity_pv = solution.capacity_pv().value();
        let capacity_battery = solution.capacity_battery().value();
        let cost_pv = parameters.cost_pv().value();
        let cost_battery = parameters.cost_battery().value();

        Self {
            objective_kind: format!("{:?}", solution.objective_kind()).to_lowercase(),
            objective: solution.objective(),
            capacity_pv,
            capacity_battery,
            cost_pv,
            cost_battery,
            capex_per_year: cost_pv * capacity_pv + cost_battery * capacity_battery,
        }
    }
}

/// A row of the dispatch CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DispatchRow {
    period: usize,
    demand: f64,
    energy_pv: f64,
    energy_battery: f64,
    energy_battery_in: f64,
    energy_battery_out: f64,
    energy_buy: f64,
    energy_sell: f64,
}

/// A row of the dual values CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DualsRow {
    period: usize,
    dual_limit_pv: f64,
    dual_limit_battery: f64,
    dual_eq_battery: f64,
    dual_eq_demand: f64,
}

/// Writes the results of a solve to an output directory
pub struct DataWriter {
    output_path: PathBuf,
    save_debug_info: bool,
}

impl DataWriter {
    /// Create a writer for the given output folder
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include dual values and diagnostics
    pub fn new(output_path: &Path, save_debug_info: bool) -> Self {
        Self {
            output_path: output_path.to_path_buf(),
            save_debug_info,
        }
    }

    /// Write all output files for a solution
    pub fn write(
        &self,
        formulation: &Formulation,
        solution: &Solution,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        self.write_summary(formulation, solution)?;
        self.write_dispatch(formulation, solution)?;
        if self.save_debug_info {
            self.write_duals(formulation, solution)?;
            self.write_diagnostics(diagnostics)?;
        }

        Ok(())
    }

    fn write_summary(&self, formulation: &Formulation, solution: &Solution) -> Result<()> {
        let summary = Summary::new(formulation, solution);
        let file_path = self.output_path.join(SUMMARY_FILE_NAME);
        fs::write(&file_path, toml::to_string(&summary)?)
            .with_context(|| format!("Failed to write {}", file_path.display()))
    }

    fn write_dispatch(&self, formulation: &Formulation, solution: &Solution) -> Result<()> {
        let columns = solution.columns();
        let primal = formulation.primal();
        let value = |vars: &[Variable], t: usize| columns[vars[t].index()];

        let mut writer = csv::Writer::from_path(self.output_path.join(DISPATCH_FILE_NAME))?;
        for (t, demand) in formulation.demand_energy().into_iter().enumerate() {
            writer.serialize(DispatchRow {
                period: t,
                demand,
                energy_pv: value(&primal.energy_pv, t),
                energy_battery: value(&primal.energy_battery, t),
                energy_battery_in: value(&primal.energy_battery_in, t),
                energy_battery_out: value(&primal.energy_battery_out, t),
                energy_buy: value(&primal.energy_buy, t),
                energy_sell: value(&primal.energy_sell, t),
            })?;
        }
        writer.flush()?;

        Ok(())
    }

    fn write_duals(&self, formulation: &Formulation, solution: &Solution) -> Result<()> {
        let columns = solution.columns();
        let dual = formulation.dual();

        let mut writer = csv::Writer::from_path(self.output_path.join(DUALS_FILE_NAME))?;
        for t in formulation.model().series.iter_periods() {
            writer.serialize(DualsRow {
                period: t,
                dual_limit_pv: columns[dual.dual_limit_pv[t].index()],
                dual_limit_battery: columns[dual.dual_limit_battery[t].index()],
                dual_eq_battery: columns[dual.dual_eq_battery[t].index()],
                dual_eq_demand: columns[dual.dual_eq_demand[t].index()],
            })?;
        }
        writer.flush()?;

        Ok(())
    }

    fn write_diagnostics(&self, diagnostics: &Diagnostics) -> Result<()> {
        let file_path = self.output_path.join(DIAGNOSTICS_FILE_NAME);
        fs::write(&file_path, toml::to_string(diagnostics)?)
            .with_context(|| format!("Failed to write {}", file_path.display()))
    }
}
