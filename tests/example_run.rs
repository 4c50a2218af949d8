//! Integration tests for the `example run` command.
use float_cmp::assert_approx_eq;
use pvkkt::cli::RunOpts;
use pvkkt::cli::example::handle_example_run_command;
use pvkkt::settings::Settings;
use std::fs;
use tempfile::tempdir;

/// Read a number from the summary file written by a run
fn read_summary_value(summary: &toml::Table, key: &str) -> f64 {
    summary[key].as_float().unwrap()
}

/// An integration test for the `example run` command, using the exact nonlinear encoding.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var("PVKKT_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let opts = RunOpts {
        output_dir: Some(tempdir.path().to_path_buf()),
        ..RunOpts::default()
    };
    handle_example_run_command("nonlinear", &opts, Some(Settings::default())).unwrap();

    let summary: toml::Table =
        toml::from_str(&fs::read_to_string(tempdir.path().join("summary.toml")).unwrap()).unwrap();
    assert_approx_eq!(
        f64,
        read_summary_value(&summary, "objective"),
        3.5,
        epsilon = 1e-5
    );
    assert_approx_eq!(
        f64,
        read_summary_value(&summary, "capacity_pv"),
        20.0,
        epsilon = 1e-4
    );

    let metadata = fs::read_to_string(tempdir.path().join("metadata.toml")).unwrap();
    assert!(metadata.contains("encoding = \"nonlinear\""));
}
