//! Integration tests for the `run` command.
use pvkkt::cli::{RunOpts, handle_run_command};
use pvkkt::settings::Settings;
use std::path::PathBuf;
use tempfile::tempdir;

/// Get the path to the example model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

/// An integration test for the `run` command.
#[test]
fn test_handle_run_command() {
    unsafe { std::env::set_var("PVKKT_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path().join("results");
    let opts = RunOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
        debug_model: true,
    };
    handle_run_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap();

    for file_name in [
        "summary.toml",
        "dispatch.csv",
        "duals.csv",
        "diagnostics.toml",
        "metadata.toml",
        "pvkkt_info.log",
        "pvkkt_error.log",
    ] {
        assert!(output_dir.join(file_name).is_file(), "{file_name} missing");
    }

    // Output folder is no longer empty
    let expected = format!(
        "Failed to create output directory: {}",
        output_dir.display()
    );
    let opts = RunOpts {
        output_dir: Some(output_dir),
        ..RunOpts::default()
    };
    assert_eq!(
        handle_run_command(&get_model_dir(), &opts, Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        expected
    );
}
