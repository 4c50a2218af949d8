//! Code for writing metadata to file
use crate::formulation::Formulation;
use crate::model::EncodingKind;
use anyhow::{Context, Result};
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    program: ProgramMetadata<'a>,
    platform: PlatformMetadata,
}

/// Information about the model run
#[derive(Serialize)]
struct RunMetadata<'a> {
    /// Path to the model which was run
    model_path: &'a Path,
    /// The date and time on which the run started
    datetime: String,
    /// How complementary slackness was encoded
    encoding: &'static str,
    /// The oracle used to solve the problem
    solver: &'a str,
    /// The number of periods in the horizon
    periods: usize,
}

impl<'a> RunMetadata<'a> {
    fn new(model_path: &'a Path, formulation: &Formulation, solver: &'a str) -> Self {
        let dt = Local::now();
        let encoding = match formulation.complementarity().encoding() {
            EncodingKind::BigM => "big_m",
            EncodingKind::Nonlinear => "nonlinear",
        };
        Self {
            model_path,
            datetime: dt.to_rfc2822(),
            encoding,
            solver,
            periods: formulation.model().series.len(),
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata<'a> {
    /// The program name
    name: &'a str,
    /// The program version as specified in Cargo.toml
    version: &'a str,
    /// Whether it is a debug build
    is_debug: bool,
}

impl Default for ProgramMetadata<'_> {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            is_debug: cfg!(debug_assertions),
        }
    }
}

/// Information about the platform on which the program is running.
///
/// The fields correspond to different data available from the [`PlatformInfo`] struct.
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow::anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write metadata to the specified output path in TOML format
pub fn write_metadata(
    output_path: &Path,
    model_path: &Path,
    formulation: &Formulation,
    solver: &str,
) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata::new(model_path, formulation, solver),
        program: ProgramMetadata::default(),
        platform: PlatformMetadata::new()?,
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model;
    use crate::model::Model;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_write_metadata(model: Model) {
        let formulation = Formulation::build(&model).unwrap();
        let dir = tempdir().unwrap();
        write_metadata(dir.path(), Path::new("demos/simple"), &formulation, "HiGHS").unwrap();

        let contents = fs::read_to_string(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let metadata: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(metadata["run"]["encoding"].as_str(), Some("big_m"));
        assert_eq!(metadata["run"]["periods"].as_integer(), Some(3));
        assert_eq!(metadata["program"]["name"].as_str(), Some("pvkkt"));
    }
}
