use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn hyacinth_run_quickstart() {
    let mut cmd = Command::cargo_bin("hyacinth").expect("binary exists");
    cmd.arg("run").arg("demos/quickstart.hy");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hello, Hyacinth"))
        .stdout(predicate::str::contains("42"));
}

#[test]
fn hyacinth_run_classes_demo() {
    let mut cmd = Command::cargo_bin("hyacinth").expect("binary exists");
    cmd.arg("run").arg("demos/classes.hy");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Rex barks"))
        .stdout(predicate::str::contains("paddling"));
}

#[test]
fn hyacinth_eval_snippet() {
    let mut cmd = Command::cargo_bin("hyacinth").expect("binary exists");
    cmd.arg("eval").arg("print 1 + 2");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn hyacinth_runs_script_from_disk() {
    let dir = tempdir().expect("create temp dir");
    let script_path = dir.path().join("sample.hy");
    fs::write(
        &script_path,
        r#"
        class Counter {
            init(limit) { self.limit = limit }
            total() {
                $sum = 0
                $i = 1
                while $i <= self.limit {
                    $sum = $sum + $i
                    $i = $i + 1
                }
                return $sum
            }
        }
        print Counter(4).total()
        "#,
    )
    .expect("write script");

    let mut cmd = Command::cargo_bin("hyacinth").expect("binary exists");
    cmd.arg("run").arg(&script_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("10"));
}

#[test]
fn hyacinth_reports_unhandled_exceptions() {
    let mut cmd = Command::cargo_bin("hyacinth").expect("binary exists");
    cmd.arg("eval").arg(r#"raise Exception("boom")"#);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unhandled exception"));
}
