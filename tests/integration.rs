use assert_cmd::Command;
use predicates::prelude::*;

fn wflint() -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wflint");
    cmd.env("NO_COLOR", "1").env_remove("WFLINT_LOG");
    cmd
}

/// `check` without external tools.
fn check() -> Command {
    let mut cmd = wflint();
    cmd.args(["check", "--shellcheck", ""]);
    cmd
}

#[test]
fn check_clean_workflow_passes() {
    check()
        .arg("tests/fixtures/clean.yaml")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"));
}

#[test]
fn check_broken_workflow_fails() {
    check()
        .arg("tests/fixtures/broken.yaml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("tests/fixtures/broken.yaml:4:"))
        .stdout(predicate::str::contains("[job-needs]"))
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn check_unparsable_workflow_fails() {
    check()
        .arg("tests/fixtures/not-yaml.yaml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[syntax-check]"));
}

#[test]
fn check_json_format() {
    let out = check()
        .args(["tests/fixtures/broken.yaml", "tests/fixtures/clean.yaml", "--format", "json", "--verbose"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&out).expect("stdout should be JSON");
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert!(!parsed[0]["passed"].as_bool().unwrap());
    assert!(parsed[1]["passed"].as_bool().unwrap());
}

#[test]
fn check_sarif_format() {
    check()
        .args(["tests/fixtures/broken.yaml", "--format", "sarif"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"version\": \"2.1.0\""));
}

#[test]
fn check_reads_stdin() {
    check()
        .args(["-", "--stdin-filename", "piped.yaml"])
        .write_stdin("on: push\njobs:\n  a:\n    needs: b\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("piped.yaml:4:"));
}

#[test]
fn ignore_flag_drops_matching_diagnostics() {
    check()
        .args(["tests/fixtures/broken.yaml", "--ignore", ".*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ignored"));
}

#[test]
fn invalid_ignore_pattern_exits_2() {
    check()
        .args(["tests/fixtures/clean.yaml", "--ignore", "(oops"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid ignore pattern"));
}

#[test]
fn unknown_rule_in_config_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("wflint.toml");
    std::fs::write(&config, "[rules]\nno-such-rule = false\n").unwrap();
    check()
        .args(["tests/fixtures/clean.yaml", "--config", config.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown rule"));
}

#[test]
fn config_disables_rules() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("wflint.toml");
    std::fs::write(&config, "[rules]\njob-needs = false\naction = false\nexpression = false\n").unwrap();
    check()
        .args(["tests/fixtures/broken.yaml", "--config", config.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn missing_file_exits_2() {
    check()
        .arg("tests/fixtures/does-not-exist.yaml")
        .assert()
        .code(2);
}

#[test]
fn discovers_workflows_directory() {
    let dir = tempfile::tempdir().unwrap();
    let workflows = dir.path().join(".github").join("workflows");
    std::fs::create_dir_all(&workflows).unwrap();
    std::fs::write(
        workflows.join("ci.yml"),
        "on: push\njobs:\n  a:\n    needs: nope\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n",
    )
    .unwrap();
    std::fs::write(workflows.join("README.md"), "not a workflow").unwrap();

    check()
        .current_dir(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("ci.yml:4:"))
        .stdout(predicate::str::contains("1 files"));
}

#[test]
fn discovers_workflows_in_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let workflows = dir.path().join(".github").join("workflows");
    std::fs::create_dir_all(&workflows).unwrap();
    std::fs::write(
        workflows.join("ci.yml"),
        "on: push\njobs:\n  a:\n    needs: nope\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n",
    )
    .unwrap();
    let nested = dir.path().join("src").join("deep");
    std::fs::create_dir_all(&nested).unwrap();

    check()
        .current_dir(&nested)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("ci.yml:4:"))
        .stdout(predicate::str::contains("1 files"));
}

#[test]
fn no_color_flag_wins_over_forced_color() {
    let colored_run = wflint()
        .env_remove("NO_COLOR")
        .env("CLICOLOR_FORCE", "1")
        .args(["check", "--shellcheck", "", "tests/fixtures/broken.yaml"])
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&colored_run.stdout).contains("\u{1b}["));

    let plain_run = wflint()
        .env_remove("NO_COLOR")
        .env("CLICOLOR_FORCE", "1")
        .args(["check", "--no-color", "--shellcheck", "", "tests/fixtures/broken.yaml"])
        .output()
        .unwrap();
    assert_eq!(plain_run.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&plain_run.stdout).contains("\u{1b}["));
}

#[test]
fn no_workflows_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    check()
        .current_dir(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no workflow files found"));
}

#[test]
fn output_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_file = dir.path().join("report.json");

    check()
        .args([
            "tests/fixtures/broken.yaml",
            "--format",
            "json",
            "--output",
            output_file.to_str().unwrap(),
        ])
        .assert()
        .code(1);

    let content = std::fs::read_to_string(&output_file).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&content).expect("Output file should contain valid JSON");
    assert!(!parsed[0]["passed"].as_bool().unwrap());
}

#[test]
fn check_tools_succeeds() {
    wflint()
        .args(["check-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("External Tools"))
        .stdout(predicate::str::contains("shellcheck"));
}

#[test]
fn list_rules_shows_rules() {
    wflint()
        .args(["list-rules"])
        .assert()
        .success()
        .stdout(predicate::str::contains("job-needs"))
        .stdout(predicate::str::contains("expression"))
        .stdout(predicate::str::contains("shellcheck"))
        .stdout(predicate::str::contains("Total: 13 rules"));
}

#[test]
fn explain_known_rule() {
    wflint()
        .args(["explain", "matrix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matrix"))
        .stdout(predicate::str::contains("Remediation"));
}

#[test]
fn explain_unknown_rule_exits_2() {
    wflint()
        .args(["explain", "nonexistent"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown rule"));
}
