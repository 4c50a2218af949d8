//! Exogenous hourly time series driving the dispatch problem.
use anyhow::{Result, ensure};
use log::warn;

/// PV availability and demand shape over a cyclic horizon.
///
/// Both series have one value per period. Period `0`'s predecessor is the last period, so the
/// battery state of charge wraps around the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pv_availability: Vec<f64>,
    demand: Vec<f64>,
}

impl TimeSeries {
    /// Create a new [`TimeSeries`], checking the two series are compatible.
    ///
    /// # Arguments
    ///
    /// * `pv_availability` - PV output per unit of capacity in each period, between 0 and 1
    /// * `demand` - Normalised demand shape in each period
    pub fn new(pv_availability: Vec<f64>, demand: Vec<f64>) -> Result<Self> {
        ensure!(
            pv_availability.len() == demand.len(),
            "Length mismatch: PV availability has {} periods but demand has {}",
            pv_availability.len(),
            demand.len()
        );
        ensure!(!demand.is_empty(), "Time series must contain at least one period");

        for (period, &value) in pv_availability.iter().enumerate() {
            ensure!(
                value.is_finite() && (0.0..=1.0).contains(&value),
                "PV availability must be between 0 and 1 (period {period}: {value})"
            );
        }

        for (period, &value) in demand.iter().enumerate() {
            ensure!(
                value.is_finite(),
                "Demand must be finite (period {period}: {value})"
            );
        }

        if let Some(period) = demand.iter().position(|&value| value < 0.0) {
            warn!(
                "Demand is negative in period {period}. Surplus energy will have to be sold to \
                the grid."
            );
        }

        Ok(Self {
            pv_availability,
            demand,
        })
    }

    /// The number of periods in the horizon
    pub fn len(&self) -> usize {
        self.demand.len()
    }

    /// Whether the horizon is empty (never true for a validated series)
    pub fn is_empty(&self) -> bool {
        self.demand.is_empty()
    }

    /// PV availability for each period
    pub fn pv_availability(&self) -> &[f64] {
        &self.pv_availability
    }

    /// Demand shape for each period
    pub fn demand(&self) -> &[f64] {
        &self.demand
    }

    /// Iterate over the periods of the horizon
    pub fn iter_periods(&self) -> std::ops::Range<usize> {
        0..self.len()
    }

    /// The period preceding `period`, wrapping around at the start of the horizon
    pub fn previous(&self, period: usize) -> usize {
        (period + self.len() - 1) % self.len()
    }

    /// The smallest strictly positive PV availability, if PV is ever available
    pub fn min_nonzero_availability(&self) -> Option<f64> {
        self.pv_availability
            .iter()
            .copied()
            .filter(|&value| value > 0.0)
            .min_by(f64::total_cmp)
    }

    /// Total PV output per unit of capacity over the horizon
    pub fn total_availability(&self) -> f64 {
        self.pv_availability.iter().sum()
    }
}
