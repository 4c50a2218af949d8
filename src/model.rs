//! The model represents the static input data provided by the user.
use crate::input::read_time_series;
use crate::series::TimeSeries;
use anyhow::{Context, Result, ensure};
use std::path::Path;

pub mod parameters;
pub use parameters::{
    EncodingKind, FormulationOptions, ModelParameters, ObjectiveKind, ParameterSet,
};

/// Model definition
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Economic and technical inputs
    pub parameters: ParameterSet,
    /// Options for building the single-level problem
    pub options: FormulationOptions,
    /// PV availability and demand series
    pub series: TimeSeries,
}

impl Model {
    /// Create a new [`Model`], checking that the dispatch problem it describes is bounded.
    pub fn new(
        parameters: ParameterSet,
        options: FormulationOptions,
        series: TimeSeries,
    ) -> Result<Self> {
        parameters.validate()?;
        options.validate()?;
        check_pv_bounded(&parameters, &series)?;

        Ok(Self {
            parameters,
            options,
            series,
        })
    }

    /// Read a model from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let model_params = ModelParameters::from_path(model_dir)?;
        let series = read_time_series(model_dir)?;

        Self::new(model_params.parameters, model_params.formulation, series)
            .with_context(|| format!("Invalid model in {}", model_dir.display()))
    }
}

/// Check that PV capacity cannot pay for itself through grid sales alone.
///
/// If a unit of PV capacity earned more from sales over the horizon than it costs, the dispatch
/// problem would be unbounded.
fn check_pv_bounded(parameters: &ParameterSet, series: &TimeSeries) -> Result<()> {
    let revenue = parameters.sell_price.value() * series.total_availability();
    let cost = parameters.cost_pv().value();
    ensure!(
        revenue <= cost,
        "Selling all PV output ({revenue} per unit of capacity) would exceed the annualised cost \
        of PV ({cost}), so PV capacity would be unbounded"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{parameters, time_series};
    use crate::units::{MoneyPerCapacity, MoneyPerEnergy};
    use rstest::rstest;

    #[rstest]
    fn test_model_new(parameters: ParameterSet, time_series: TimeSeries) {
        assert!(Model::new(parameters, FormulationOptions::default(), time_series).is_ok());
    }

    #[rstest]
    fn test_model_new_unbounded_pv(parameters: ParameterSet, time_series: TimeSeries) {
        let parameters = ParameterSet {
            price_pv: MoneyPerCapacity(0.5),
            sell_price: MoneyPerEnergy(0.1),
            ..parameters
        };
        assert!(Model::new(parameters, FormulationOptions::default(), time_series).is_err());
    }
}
