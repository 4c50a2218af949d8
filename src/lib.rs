//! Common functionality for pvkkt.
//!
//! pvkkt sizes a household PV and battery installation by replacing the hourly dispatch problem
//! with its Karush-Kuhn-Tucker conditions, turning a bilevel problem into a single mixed-integer
//! linear program.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod diagnostics;
pub mod formulation;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod series;
pub mod settings;
pub mod solution;
pub mod solver;
pub mod units;

#[cfg(test)]
mod fixture;

/// Where to report bugs
pub const ISSUES_URL: &str = "https://github.com/pvkkt/pvkkt/issues";

/// Get the config dir for the program
pub fn get_pvkkt_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir on this platform; fall back to the current directory
        return PathBuf::new();
    };
    config_dir.push("pvkkt");

    config_dir
}
