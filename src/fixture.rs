//! Fixtures for tests

use crate::model::{FormulationOptions, Model, ParameterSet};
use crate::series::TimeSeries;
use crate::units::{Energy, MoneyPerCapacity, MoneyPerEnergy, Year};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn parameters() -> ParameterSet {
    ParameterSet {
        lifetime: Year(10.0),
        price_pv: MoneyPerCapacity(1000.0),
        price_battery: MoneyPerCapacity(300.0),
        cost_buy: MoneyPerEnergy(0.25),
        sell_price: MoneyPerEnergy(0.05),
        demand_total: Energy(10.0),
    }
}

#[fixture]
pub fn time_series() -> TimeSeries {
    TimeSeries::new(vec![0.0, 1.0, 0.5], vec![1.0, 0.0, 1.0]).unwrap()
}

#[fixture]
pub fn model(parameters: ParameterSet, time_series: TimeSeries) -> Model {
    Model::new(parameters, FormulationOptions::default(), time_series).unwrap()
}
