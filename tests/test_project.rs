use std::fs;
use std::path::{Path, PathBuf};

use wflint::config::LintOptions;
use wflint::diagnostic::Diagnostic;
use wflint::lint::Linter;

const CALLEE: &str = "on:
  workflow_call:
    inputs:
      need:
        type: string
        required: true
    secrets:
      token:
        required: false
jobs:
  run:
    runs-on: ubuntu-latest
    steps:
      - run: echo ${{ inputs.need }}
";

const GREET_ACTION: &str = "name: Greet
inputs:
  who:
    required: true
  greeting:
    default: hello
runs:
  using: node20
  main: index.js
";

fn offline() -> LintOptions {
    LintOptions {
        shellcheck: None,
        ..LintOptions::default()
    }
}

/// Helper: a repository with the reusable workflow and local action above.
fn repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let workflows = dir.path().join(".github/workflows");
    fs::create_dir_all(&workflows).unwrap();
    fs::write(workflows.join("callee.yml"), CALLEE).unwrap();
    let action = dir.path().join("tools/greet");
    fs::create_dir_all(&action).unwrap();
    fs::write(action.join("action.yml"), GREET_ACTION).unwrap();
    dir
}

fn write_caller(repo: &Path, src: &str) -> PathBuf {
    let path = repo.join(".github/workflows/caller.yml");
    fs::write(&path, src).unwrap();
    path
}

fn action_diags(linter: &Linter, path: &Path) -> Vec<Diagnostic> {
    linter
        .lint_file(path)
        .unwrap()
        .diagnostics
        .into_iter()
        .filter(|d| d.rule_id == "action")
        .collect()
}

#[test]
fn reusable_workflow_inputs_are_checked() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n    with:\n      unknown_input: 1\n",
    );
    let d = action_diags(&Linter::new(offline()).unwrap(), &caller);

    assert_eq!(d.len(), 2, "{d:?}");
    assert_eq!((d[0].line, d[0].column), (4, 11));
    assert!(d[0].message.contains("input \"need\" is required"), "{}", d[0].message);
    assert_eq!((d[1].line, d[1].column), (6, 7));
    assert!(
        d[1].message.contains("input \"unknown_input\" is not defined"),
        "{}",
        d[1].message
    );
    assert!(d[1].message.contains("available inputs are \"need\""));
}

#[test]
fn satisfied_call_is_clean() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n    with:\n      NEED: x\n    secrets:\n      token: ${{ secrets.T }}\n",
    );
    let d = action_diags(&Linter::new(offline()).unwrap(), &caller);
    assert!(d.is_empty(), "{d:?}");
}

#[test]
fn unknown_secret_is_reported_unless_inherited() {
    let dir = repo();
    let linter = Linter::new(offline()).unwrap();

    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n    with:\n      need: x\n    secrets:\n      bogus: y\n",
    );
    let d = action_diags(&linter, &caller);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.contains("secret \"bogus\" is not defined"));

    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n    with:\n      need: x\n    secrets: inherit\n",
    );
    assert!(action_diags(&linter, &caller).is_empty());
}

#[test]
fn missing_reusable_workflow_file() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/gone.yml\n",
    );
    let d = action_diags(&Linter::new(offline()).unwrap(), &caller);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.contains("does not exist"));
}

#[test]
fn local_action_inputs_are_checked() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: ./tools/greet\n        with:\n          wh: x\n",
    );
    let d = action_diags(&Linter::new(offline()).unwrap(), &caller);
    assert_eq!(d.len(), 2, "{d:?}");
    assert!(d[0].message.contains("missing input \"who\" which is required by action \"Greet\""));
    assert!(d[1].message.contains("input \"wh\" is not defined in action \"Greet\""));
}

#[test]
fn local_action_created_at_run_time_is_skipped() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: ./checked-out/action\n        with:\n          anything: 1\n",
    );
    assert!(action_diags(&Linter::new(offline()).unwrap(), &caller).is_empty());
}

#[test]
fn callees_are_read_once_per_linter() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n",
    );
    let linter = Linter::new(offline()).unwrap();
    let first = action_diags(&linter, &caller);
    assert_eq!(first.len(), 1, "{first:?}");

    fs::remove_file(dir.path().join(".github/workflows/callee.yml")).unwrap();
    let second = action_diags(&linter, &caller);
    assert_eq!(second, first);

    let fresh = action_diags(&Linter::new(offline()).unwrap(), &caller);
    assert!(fresh[0].message.contains("does not exist"));
}

#[test]
fn disabled_action_rule_skips_callees() {
    let dir = repo();
    let caller = write_caller(
        dir.path(),
        "on: push\njobs:\n  call:\n    uses: ./.github/workflows/callee.yml\n    with:\n      unknown_input: 1\n",
    );
    let mut options = offline();
    options.disabled_rules.insert("action".to_string());
    assert!(action_diags(&Linter::new(options).unwrap(), &caller).is_empty());
}
