use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn rill() -> Command {
    Command::cargo_bin("rill").expect("binary exists")
}

#[test]
fn run_executes_a_script_file() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("hello.rl");
    fs::write(
        &script,
        "fn greet(name) { return 'Hello, ' + name + '!' }\nprint(greet('Rill'))\n",
    )
    .expect("write script");

    rill()
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, Rill!"));
}

#[test]
fn eval_prints_a_non_void_result() {
    rill()
        .arg("eval")
        .arg("1 + 2 + 3")
        .assert()
        .success()
        .stdout("6\n");

    rill().arg("eval").arg("fn noop() {}").assert().success().stdout("");
}

#[test]
fn failing_script_exits_non_zero_with_a_located_diagnostic() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("broken.rl");
    fs::write(&script, "print('start')\nmissing + 1\nprint('never')\n").expect("write script");

    rill()
        .arg("run")
        .arg(&script)
        .assert()
        .failure()
        .stdout(predicate::str::contains("start").and(predicate::str::contains("never").not()))
        .stderr(
            predicate::str::contains("BindingError: unknown variable `missing`")
                .and(predicate::str::contains("broken.rl:2:1")),
        );
}

#[test]
fn parse_errors_are_reported() {
    rill()
        .arg("eval")
        .arg("f(1, 2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ParseError: unmatched `(`"));
}

#[test]
fn missing_script_is_an_io_error() {
    let dir = tempdir().expect("create temp dir");
    rill()
        .arg("run")
        .arg(dir.path().join("absent.rl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
}

#[test]
fn tuning_flags_are_accepted() {
    rill()
        .args(["--workers", "1", "--idle-ticks", "2", "eval", "await sleep(1)\n'slept'"])
        .assert()
        .success()
        .stdout("slept\n");
}
