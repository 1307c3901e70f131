//! Subcommands against a real configuration directory.

use sensflow_demo::cli::{RunArgs, SetArgs, describe, run_monitor, set};
use sensflow_demo::{DemoError, Settings};
use serde_json::Value;

/// Defaults with a fixed device address, so no lookup leaves the host.
fn offline() -> Settings {
    let mut settings = Settings::default();
    settings.system.ip_address = Some("192.168.0.50".to_owned());
    settings
}

fn settings_in(dir: &tempfile::TempDir) -> Settings {
    Settings {
        config_dir: Some(dir.path().to_path_buf()),
        ..offline()
    }
}

fn describe_json(settings: &Settings) -> Value {
    let mut out = Vec::new();
    describe(settings, &mut out).expect("describe");
    serde_json::from_slice(&out).expect("describe prints JSON")
}

#[test]
fn set_persists_for_the_next_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings_in(&dir);

    let args = SetArgs {
        path: "/bilge/samples".to_owned(),
        values: r#"{"sample_size": 20}"#.to_owned(),
    };
    let mut out = Vec::new();
    set(&settings, &args, &mut out).expect("valid change");
    let report: Value = serde_json::from_slice(&out).expect("report is JSON");
    assert_eq!(report["applied"], serde_json::json!(["sample_size"]));

    assert!(dir.path().join("bilge").join("samples.json").is_file());
    let all = describe_json(&settings);
    assert_eq!(all["/bilge/samples"]["values"]["sample_size"], 20);
    assert_eq!(all["/bilge/linear"]["values"]["multiplier"], 0.01724);
}

#[test]
fn rejected_field_fails_but_keeps_valid_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings_in(&dir);

    let args = SetArgs {
        path: "/bilge/samples".to_owned(),
        values: r#"{"sample_size": 0, "multiplier": 2.0}"#.to_owned(),
    };
    let err = set(&settings, &args, &mut Vec::new()).expect_err("sample_size out of range");
    assert!(matches!(err, DemoError::InvalidArgument { .. }));

    let all = describe_json(&settings);
    assert_eq!(all["/bilge/samples"]["values"]["sample_size"], 10);
    assert_eq!(all["/bilge/samples"]["values"]["multiplier"], 2.0);
}

#[test]
fn lab_run_writes_default_parameters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings_in(&dir);
    let args = RunArgs {
        duration_secs: Some(3),
        lab: true,
        ..RunArgs::default()
    };
    run_monitor(&settings, &args).expect("lab run");

    for file in [
        "bilgeWaterTemperature/oneWire.json",
        "cabinTemperature/linear.json",
        "bilge/ultrasonic_in.json",
    ] {
        assert!(dir.path().join(file).is_file(), "missing {file}");
    }
}

#[test]
fn dry_run_builds_without_reading() {
    let args = RunArgs {
        dry_run: true,
        ..RunArgs::default()
    };
    run_monitor(&offline(), &args).expect("valid topology");
}
