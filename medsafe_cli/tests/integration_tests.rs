//! Integration tests for the medsafe binary.
//!
//! These tests verify end-to-end behavior including:
//! - Prescription screening against file-backed patient records
//! - Monitoring reports
//! - Rule table loading and validation
//! - Failure on unreadable records

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI isolated from any real user config
fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("medsafe"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(temp_dir.path());
    cmd
}

fn write_patient(data_dir: &Path, id: &str, json: &str) {
    let dir = data_dir.join("patients");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.json", id)), json).unwrap();
}

const WARFARIN_PATIENT: &str = r#"{
  "medication_requests": [
    { "code": "11289", "display": "Warfarin", "status": "active" },
    { "code": "6809", "display": "Metformin", "status": "stopped" }
  ],
  "medication_statements": [],
  "conditions": [
    { "code": "44054006", "display": "Type 2 diabetes", "clinical_status": "active" },
    { "code": "709044004", "display": "Chronic kidney disease", "clinical_status": "resolved" }
  ],
  "observations": []
}"#;

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Clinical medication safety screening",
        ));
}

#[test]
fn test_major_interaction_blocks() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    cli(&temp_dir)
        .args(["check", "--patient", "p1", "--code", "1191", "--name", "Aspirin"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("NOT SAFE TO PRESCRIBE"))
        .stdout(predicate::str::contains("major drug interaction"))
        .stdout(predicate::str::contains("Warfarin"));
}

#[test]
fn test_safe_prescription() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    // Metformin is stopped and the kidney disease is resolved
    cli(&temp_dir)
        .args(["check", "--patient", "p1", "--code", "6809", "--name", "Metformin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SAFE TO PRESCRIBE"))
        .stdout(predicate::str::contains("NOT SAFE").not());
}

#[test]
fn test_duplicate_therapy_from_statement() {
    let temp_dir = setup_test_dir();
    write_patient(
        temp_dir.path(),
        "p2",
        r#"{ "medication_statements": [ { "code": "29046", "display": "Lisinopril" } ] }"#,
    );

    cli(&temp_dir)
        .args(["check", "--patient", "p2", "--code", "29046", "--name", "Lisinopril"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("duplicate therapy"))
        .stdout(predicate::str::contains("Patient reports taking Lisinopril"));
}

#[test]
fn test_check_json_output() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    let output = cli(&temp_dir)
        .args([
            "check", "--patient", "p1", "--code", "5640", "--name", "Ibuprofen", "--json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let decision: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(decision["overall_safe"], false);
    assert_eq!(decision["patient_id"], "p1");
    assert_eq!(decision["drug_interactions"]["safe_to_prescribe"], false);
    assert_eq!(
        decision["drug_interactions"]["interactions"][0]["severity"],
        "major"
    );
    assert_eq!(decision["duplicate_therapy"]["is_duplicate"], false);
    assert!(decision["decision_id"].is_string());
    assert!(decision["screening_note"]
        .as_str()
        .unwrap()
        .contains("not exhaustive"));
}

#[test]
fn test_unknown_patient_fails() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .args(["check", "--patient", "ghost", "--code", "1191", "--name", "Aspirin"])
        .assert()
        .failure()
        .code(predicate::ne(2))
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_corrupt_patient_file_fails_closed() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", "{ \"medication_requests\": [ oops");

    cli(&temp_dir)
        .args(["check", "--patient", "p1", "--code", "1191", "--name", "Aspirin"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("SAFE TO PRESCRIBE").not());
}

#[test]
fn test_alerts_report() {
    let temp_dir = setup_test_dir();
    let recent = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    let json = format!(
        r#"{{
  "conditions": [ {{ "code": "38341003", "display": "Hypertension" }} ],
  "observations": [
    {{
      "code": "85354-9",
      "display": "Blood pressure",
      "value": {{ "components": [
        {{ "code": "8480-6", "value": 190 }},
        {{ "code": "8462-4", "value": 100 }}
      ] }},
      "effective": "{}"
    }}
  ]
}}"#,
        recent
    );
    write_patient(temp_dir.path(), "p3", &json);

    cli(&temp_dir)
        .args(["alerts", "--patient", "p3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hypertensive Crisis"))
        .stdout(predicate::str::contains("190/100"))
        .stdout(predicate::str::contains("No care gaps"));
}

#[test]
fn test_alerts_json_with_csv_observations() {
    let temp_dir = setup_test_dir();
    write_patient(
        temp_dir.path(),
        "p4",
        r#"{ "conditions": [ { "code": "44054006", "display": "Type 2 diabetes" } ] }"#,
    );
    let recent = (chrono::Utc::now() - chrono::Duration::days(3)).format("%Y-%m-%d");
    let csv = format!(
        "id,code,display,value,unit,systolic,diastolic,effective\n\
         g1,1558-6,Fasting glucose,45,mg/dL,,,{recent}\n\
         g2,1558-6,Fasting glucose,not-a-number,mg/dL,,,{recent}\n\
         h1,4548-4,HbA1c,7.5,%,,,not-a-date\n"
    );
    fs::write(
        temp_dir.path().join("patients").join("p4.observations.csv"),
        csv,
    )
    .unwrap();

    let output = cli(&temp_dir)
        .args(["alerts", "--patient", "p4", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let alerts = report["critical_alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["title"], "Critical Low Glucose");

    // HbA1c with an unusable date counts as never done
    let gaps = report["care_gaps"].as_array().unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0]["gap_type"], "hba1c_monitoring");
    assert_eq!(gaps[0]["days_since_last_completed"], 999);
    assert_eq!(gaps[0]["priority"], "High");
}

#[test]
fn test_rules_validate_builtin() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["rules", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rule tables valid (built-in tables)"));
}

#[test]
fn test_rules_show_lists_both_directions() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .args(["rules", "show", "1191"])
        .assert()
        .success()
        // Registered under warfarin, named by aspirin as partner
        .stdout(predicate::str::contains("11289 -> 1191 [Major]"))
        .stdout(predicate::str::contains("1191 -> 5640 [Moderate]"))
        .stdout(predicate::str::contains("13200003"));
}

#[test]
fn test_invalid_rule_file_is_refused() {
    let temp_dir = setup_test_dir();
    let rules_path = temp_dir.path().join("rules.toml");
    fs::write(
        &rules_path,
        r#"
[[interactions]]
subject = "1191"
partner = "1191"
severity = "major"
description = "Self interaction"
"#,
    )
    .unwrap();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    cli(&temp_dir)
        .arg("--rules")
        .arg(&rules_path)
        .args(["rules", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("interacts with itself"));

    cli(&temp_dir)
        .arg("--rules")
        .arg(&rules_path)
        .args(["check", "--patient", "p1", "--code", "1191", "--name", "Aspirin"])
        .assert()
        .failure()
        .code(predicate::ne(2));
}

#[test]
fn test_custom_rule_file_replaces_builtin() {
    let temp_dir = setup_test_dir();
    let rules_path = temp_dir.path().join("rules.toml");
    fs::write(
        &rules_path,
        r#"
[[interactions]]
subject = "6809"
partner = "11289"
severity = "moderate"
description = "Monitor INR"
"#,
    )
    .unwrap();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    // Aspirin is no longer a known interaction under the custom table
    cli(&temp_dir)
        .arg("--rules")
        .arg(&rules_path)
        .args(["check", "--patient", "p1", "--code", "1191", "--name", "Aspirin"])
        .assert()
        .success();

    // Registered under the candidate, found by the forward probe
    cli(&temp_dir)
        .arg("--rules")
        .arg(&rules_path)
        .args(["check", "--patient", "p1", "--code", "6809", "--name", "Metformin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CAUTION"))
        .stdout(predicate::str::contains("Monitor INR"));
}

#[test]
fn test_out_of_range_critical_window_is_a_config_error() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);
    let config_dir = temp_dir.path().join("config").join("medsafe");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[monitoring]\ncritical_window_days = 200000000000000\n",
    )
    .unwrap();

    cli(&temp_dir)
        .args(["alerts", "--patient", "p1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn test_alerts_text_shows_gap_priority() {
    let temp_dir = setup_test_dir();
    write_patient(temp_dir.path(), "p1", WARFARIN_PATIENT);

    // Diabetic with no HbA1c on record
    cli(&temp_dir)
        .args(["alerts", "--patient", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[High] HbA1c Monitoring"));
}

#[test]
fn test_rules_show_includes_contraindication_note() {
    let temp_dir = setup_test_dir();
    let rules_path = temp_dir.path().join("rules.toml");
    fs::write(
        &rules_path,
        r#"
[[contraindications]]
medication = "6809"
conditions = ["709044004"]
note = "Risk of lactic acidosis"
"#,
    )
    .unwrap();

    cli(&temp_dir)
        .arg("--rules")
        .arg(&rules_path)
        .args(["rules", "show", "6809"])
        .assert()
        .success()
        .stdout(predicate::str::contains("709044004"))
        .stdout(predicate::str::contains("Note: Risk of lactic acidosis"));
}

#[test]
fn test_resolved_config_is_logged_after_init() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .env("RUST_LOG", "debug")
        .args(["rules", "validate"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Using config"));
}
