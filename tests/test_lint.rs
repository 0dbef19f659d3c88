use std::path::{Path, PathBuf};

use regex::Regex;
use wflint::config::LintOptions;
use wflint::diagnostic::Status;
use wflint::lint::Linter;

const BROKEN: &str = "on: push\njobs:\n  a:\n    needs: [x, y]\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo ${{ nope.a }}\n        shell: zsh\n";

fn offline() -> LintOptions {
    LintOptions {
        shellcheck: None,
        ..LintOptions::default()
    }
}

fn lint(options: LintOptions, src: &str) -> wflint::diagnostic::Report {
    Linter::new(options)
        .unwrap()
        .lint_source(Path::new("w.yaml"), src)
}

#[test]
fn ignore_pattern_matching_everything_empties_report() {
    let base = lint(offline(), BROKEN);
    assert!(!base.diagnostics.is_empty());

    let options = LintOptions {
        ignore: vec![Regex::new(".*").unwrap()],
        ..offline()
    };
    let report = lint(options, BROKEN);
    assert!(report.diagnostics.is_empty());
    assert_eq!(report.ignored, base.diagnostics.len());
    assert!(report.passed);
}

#[test]
fn ignore_pattern_matching_nothing_changes_nothing() {
    let base = lint(offline(), BROKEN);
    let options = LintOptions {
        ignore: vec![Regex::new("^this never matches$").unwrap()],
        ..offline()
    };
    let report = lint(options, BROKEN);
    assert_eq!(report.diagnostics, base.diagnostics);
    assert_eq!(report.ignored, 0);
}

#[test]
fn disabled_rule_produces_nothing() {
    let mut options = offline();
    options.disabled_rules.insert("shell-name".to_string());
    let report = lint(options, BROKEN);
    assert!(report.diagnostics.iter().all(|d| d.rule_id != "shell-name"));
    assert!(report.diagnostics.iter().any(|d| d.rule_id == "job-needs"));
}

#[test]
fn output_is_deterministic() {
    let a = lint(offline(), BROKEN);
    for _ in 0..10 {
        assert_eq!(lint(offline(), BROKEN).diagnostics, a.diagnostics);
    }
}

#[test]
fn diagnostics_are_totally_ordered() {
    let report = lint(offline(), BROKEN);
    let keys: Vec<_> = report
        .diagnostics
        .iter()
        .map(|d| (d.line, d.column, d.rule_id.clone(), d.message.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn structural_failures_do_not_stop_a_batch() {
    let inputs = vec![
        (PathBuf::from("good.yaml"), "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n".to_string()),
        (PathBuf::from("empty.yaml"), String::new()),
        (PathBuf::from("list.yaml"), "- a\n- b\n".to_string()),
        (PathBuf::from("bad.yaml"), BROKEN.to_string()),
    ];
    let reports = Linter::new(offline()).unwrap().lint_inputs(&inputs);

    let paths: Vec<_> = reports.iter().map(|r| r.path.to_string_lossy().to_string()).collect();
    assert_eq!(paths, vec!["good.yaml", "empty.yaml", "list.yaml", "bad.yaml"]);

    assert!(reports[0].passed);
    for r in &reports[1..3] {
        assert_eq!(r.diagnostics.len(), 1, "{:?}", r.diagnostics);
        assert_eq!(r.diagnostics[0].rule_id, "syntax-check");
    }
    assert!(reports[3].diagnostics.len() >= 3);
}

#[test]
fn strict_mode_fails_on_warnings() {
    use wflint::ast::Pos;
    use wflint::diagnostic::{Diagnostic, Report, Severity};

    let warning = Diagnostic::new("shellcheck", Severity::Warning, PathBuf::from("w.yaml"), Pos::new(1, 1), "w");
    let relaxed = Report::new(PathBuf::from("w.yaml"), vec![warning.clone()], 0, false);
    assert_eq!(relaxed.status, Status::Warning);
    assert!(!relaxed.passed);

    let strict = Report::new(PathBuf::from("w.yaml"), vec![warning], 0, true);
    assert_eq!(strict.status, Status::Failed);
    assert_eq!(strict.count_by_severity(), (0, 1, 0));
}

#[test]
fn reads_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ci.yml");
    std::fs::write(&path, BROKEN).unwrap();
    let report = Linter::new(offline()).unwrap().lint_file(&path).unwrap();
    assert_eq!(report.path, path);
    assert!(report.diagnostics.iter().all(|d| d.file == path));

    assert!(Linter::new(offline())
        .unwrap()
        .lint_file(&dir.path().join("missing.yml"))
        .is_err());
}
