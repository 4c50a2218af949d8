//! Program settings, read from `settings.toml` in the pvkkt config directory.
//!
//! Settings apply to every run. The `run` command can switch on `overwrite` and `debug_model` for
//! a single run, and the `PVKKT_LOG_LEVEL` environment variable takes precedence over
//! `log_level`.
use crate::get_pvkkt_config_dir;
use crate::input::read_toml;
use crate::log::{DEFAULT_LOG_LEVEL, LOG_LEVEL_ENV_VAR, parse_log_level};
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Path to the settings file in the pvkkt config directory
pub fn get_settings_file_path() -> PathBuf {
    get_pvkkt_config_dir().join(SETTINGS_FILE_NAME)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Settings shared by every pvkkt run
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Log level: off, error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Replace the results of an earlier run of the same model
    #[serde(default)]
    pub overwrite: bool,
    /// Also write duals.csv and diagnostics.toml for each run
    #[serde(default)]
    pub debug_model: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            debug_model: false,
        }
    }
}

impl Settings {
    /// Load the settings file, or the defaults if there isn't one
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        parse_log_level(&settings.log_level)
            .with_context(|| format!("Invalid log_level in {}", file_path.display()))?;

        Ok(settings)
    }

    /// Switch on the options requested for a single run
    pub fn with_run_overrides(mut self, overwrite: bool, debug_model: bool) -> Self {
        self.overwrite |= overwrite;
        self.debug_model |= debug_model;
        self
    }

    /// A `settings.toml` with every setting commented out at its default value
    pub fn default_file_contents() -> Result<String> {
        let defaults =
            toml::to_string(&Settings::default()).context("Could not convert settings to TOML")?;

        let mut out = String::new();
        writeln!(&mut out, "# pvkkt settings, applied to every run.")?;
        writeln!(
            &mut out,
            "# {LOG_LEVEL_ENV_VAR} overrides log_level. Uncomment a setting to change it."
        )?;
        for line in defaults.lines() {
            let Some((field, _)) = line.split_once('=') else {
                continue;
            };
            let field = field.trim();
            let docs = Settings::get_field_docs(field)
                .with_context(|| format!("No description for setting {field}"))?;
            writeln!(&mut out)?;
            for doc_line in docs.lines() {
                writeln!(&mut out, "# # {}", doc_line.trim())?;
            }
            writeln!(&mut out, "# {}", line.trim())?;
        }

        Ok(out)
    }
}
