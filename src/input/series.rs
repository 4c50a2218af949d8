//! Code for reading the PV availability and demand time series.
use super::read_csv;
use crate::series::TimeSeries;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const PV_AVAILABILITY_FILE_NAME: &str = "pv_availability.csv";
const DEMAND_FILE_NAME: &str = "demand.csv";

/// A single row of a time series CSV file
#[derive(Debug, Deserialize, PartialEq)]
struct SeriesRow {
    value: f64,
}

/// Read the values from a single-column time series file
fn read_series_file(file_path: &Path) -> Result<Vec<f64>> {
    let rows: Vec<SeriesRow> = read_csv(file_path)?;
    Ok(rows.into_iter().map(|row| row.value).collect())
}

/// Read the PV availability and demand series from the specified model directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The validated [`TimeSeries`] or an error.
pub fn read_time_series(model_dir: &Path) -> Result<TimeSeries> {
    let pv_availability = read_series_file(&model_dir.join(PV_AVAILABILITY_FILE_NAME))?;
    let demand = read_series_file(&model_dir.join(DEMAND_FILE_NAME))?;

    TimeSeries::new(pv_availability, demand).with_context(|| {
        format!(
            "Invalid time series in {} ({PV_AVAILABILITY_FILE_NAME}, {DEMAND_FILE_NAME})",
            model_dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_series(dir: &Path, file_name: &str, values: &[f64]) {
        let mut contents = "value\n".to_string();
        for value in values {
            contents.push_str(&format!("{value}\n"));
        }
        fs::write(dir.join(file_name), contents).unwrap();
    }

    #[test]
    fn test_read_time_series() {
        let dir = tempdir().unwrap();
        write_series(dir.path(), PV_AVAILABILITY_FILE_NAME, &[0.0, 1.0, 0.5]);
        write_series(dir.path(), DEMAND_FILE_NAME, &[1.0, 0.0, 1.0]);

        let series = read_time_series(dir.path()).unwrap();
        assert_eq!(series.pv_availability(), &[0.0, 1.0, 0.5]);
        assert_eq!(series.demand(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_read_time_series_length_mismatch() {
        let dir = tempdir().unwrap();
        write_series(dir.path(), PV_AVAILABILITY_FILE_NAME, &[0.0, 1.0, 0.5]);
        write_series(dir.path(), DEMAND_FILE_NAME, &[1.0, 0.0, 1.0, 1.0]);

        let error = read_time_series(dir.path()).unwrap_err();
        assert_eq!(
            error.to_string(),
            format!(
                "Invalid time series in {} (pv_availability.csv, demand.csv)",
                dir.path().display()
            )
        );
    }

    #[test]
    fn test_read_time_series_missing_file() {
        let dir = tempdir().unwrap();
        write_series(dir.path(), PV_AVAILABILITY_FILE_NAME, &[0.0, 1.0, 0.5]);

        assert!(read_time_series(dir.path()).is_err());
    }
}
