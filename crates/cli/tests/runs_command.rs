mod helpers;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn align_records_a_run_and_runs_lists_it() {
    let temp = tempfile::tempdir().unwrap();
    helpers::write_align_fixture(temp.path());
    let out = temp.path().join("out");
    let ledger = temp.path().join("runs.db");

    Command::cargo_bin("symjoin")
        .unwrap()
        .args([
            "align",
            "--dwarf",
            temp.path().join("oracle_functions.json").to_str().unwrap(),
            "--spans",
            temp.path().join("source_spans.json").to_str().unwrap(),
            "--preprocessed",
            temp.path().join("preprocessed").to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--runs-db",
            ledger.to_str().unwrap(),
        ])
        .assert()
        .success();

    Command::cargo_bin("symjoin")
        .unwrap()
        .args(["runs", "--db", ledger.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs (1):"))
        .stdout(predicate::str::contains("engine=align"))
        .stdout(predicate::str::contains("cafef00d [succeeded]"));
}

#[test]
fn runs_emits_json_when_asked() {
    let temp = tempfile::tempdir().unwrap();
    helpers::write_align_fixture(temp.path());
    let out = temp.path().join("out");
    let ledger = temp.path().join("runs.db");

    Command::cargo_bin("symjoin")
        .unwrap()
        .args([
            "align",
            "--dwarf",
            temp.path().join("oracle_functions.json").to_str().unwrap(),
            "--spans",
            temp.path().join("source_spans.json").to_str().unwrap(),
            "--preprocessed",
            temp.path().join("preprocessed").to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--runs-db",
            ledger.to_str().unwrap(),
        ])
        .assert()
        .success();

    let output = Command::cargo_bin("symjoin")
        .unwrap()
        .args(["runs", "--db", ledger.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let runs: Vec<serde_json::Value> =
        serde_json::from_str(std::str::from_utf8(&output).unwrap()).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["binary"], "cafef00d");
    assert_eq!(runs[0]["engine"], "align");
    assert_eq!(runs[0]["status"], "succeeded");
}

#[test]
fn runs_filter_by_binary_excludes_others() {
    let temp = tempfile::tempdir().unwrap();
    helpers::write_align_fixture(temp.path());
    let out = temp.path().join("out");
    let ledger = temp.path().join("runs.db");

    Command::cargo_bin("symjoin")
        .unwrap()
        .args([
            "align",
            "--dwarf",
            temp.path().join("oracle_functions.json").to_str().unwrap(),
            "--spans",
            temp.path().join("source_spans.json").to_str().unwrap(),
            "--preprocessed",
            temp.path().join("preprocessed").to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--runs-db",
            ledger.to_str().unwrap(),
        ])
        .assert()
        .success();

    Command::cargo_bin("symjoin")
        .unwrap()
        .args(["runs", "--db", ledger.to_str().unwrap(), "--binary", "someone-else"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs (0):"))
        .stdout(predicate::str::contains("(none)"));
}
