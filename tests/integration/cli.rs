//! End-to-end runs of the `catcalc` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use crate::common::{HANGER_MARKING, write_snapshot};

const CYCLIC_YAML: &str = r#"
detail_types:
  - { id: 1, name: Hanger, designation: FHD, category: product }
variants:
  - { id: 10, detail_type_id: 1, name: FHD-1, marking_template: "FHD {{ a }}" }
attributes:
  - { id: 1, detail_type_id: 1, name: a, type: integer, calculated_value: "b + 1" }
  - { id: 2, detail_type_id: 1, name: b, type: integer, calculated_value: "a + 1" }
"#;

/// `catcalc` isolated from the user's configuration.
fn catcalc(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catcalc").unwrap();
    cmd.env("HOME", home.path()).env("NO_COLOR", "1").env_remove("CATCALC_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_recalculate_writes_output() {
    let temp = TempDir::new().unwrap();
    let input = write_snapshot(temp.path(), "catalog.yaml");
    let output = temp.path().join("out.yaml");

    catcalc(&temp)
        .args(["recalculate", "--no-progress", "-s"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recalculated 3 item(s), skipped 0"));

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains(HANGER_MARKING));
    // The input stays untouched.
    assert!(!std::fs::read_to_string(&input).unwrap().contains(HANGER_MARKING));
}

#[test]
fn test_recalculate_json_summary() {
    let temp = TempDir::new().unwrap();
    let input = write_snapshot(temp.path(), "catalog.yaml");

    let assert = catcalc(&temp)
        .args(["recalculate", "--dry-run", "--format", "json", "--category", "product", "-s"])
        .arg(&input)
        .assert()
        .success();

    let summary: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["recalculated"], 1);
    assert_eq!(summary["skipped"], 2);
    assert_eq!(summary["failures"], serde_json::json!([]));
}

#[test]
fn test_order_lists_formulas() {
    let temp = TempDir::new().unwrap();
    let input = write_snapshot(temp.path(), "catalog.yaml");

    catcalc(&temp)
        .args(["order", "--variant", "10", "-s"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("d = a * 2"))
        .stdout(predicate::str::contains("E = d + 5"));

    catcalc(&temp)
        .args(["order", "--variant", "99", "-s"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("99"));
}

#[test]
fn test_render_child_reference() {
    let temp = TempDir::new().unwrap();

    catcalc(&temp)
        .args(["render", "{{ 5 * <HDH-12>.e }}", "--child", "HDH-12.e=2"])
        .assert()
        .success()
        .stdout(predicate::str::diff("10\n"));

    catcalc(&temp)
        .args(["render", "--formula", "d * 2 + 1", "-p", "d=4"])
        .assert()
        .success()
        .stdout(predicate::str::diff("9\n"));
}

#[test]
fn test_render_undefined_variable_fails() {
    let temp = TempDir::new().unwrap();

    catcalc(&temp)
        .args(["render", "FHD {{ thickness }}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template rendering failed"))
        .stderr(predicate::str::contains("thickness"));
}

#[test]
fn test_validate() {
    let temp = TempDir::new().unwrap();
    let valid = write_snapshot(temp.path(), "catalog.yaml");
    let cyclic = temp.path().join("cyclic.yaml");
    std::fs::write(&cyclic, CYCLIC_YAML).unwrap();

    catcalc(&temp)
        .args(["validate", "-s"])
        .arg(&valid)
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot is valid"));

    catcalc(&temp)
        .args(["validate", "-s"])
        .arg(&cyclic)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Cyclic dependency between attributes: a, b"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let input = write_snapshot(temp.path(), "catalog.yaml");
    let config = temp.path().join("config.toml");
    std::fs::write(&config, "number_precision = 99\n").unwrap();

    catcalc(&temp)
        .arg("--config")
        .arg(&config)
        .args(["validate", "-s"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("number_precision must be at most"));
}
