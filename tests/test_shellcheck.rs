use std::path::Path;
use std::time::Duration;

use wflint::config::LintOptions;
use wflint::diagnostic::{Diagnostic, Severity};
use wflint::lint::Linter;
use wflint::shellcheck::{self, BridgeOptions};

const TWO_SCRIPTS: &str = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo $FOO\n      - run: echo $FOO\n";

/// Helper: lint `src` with only the shellcheck bridge, using `executable`.
fn lint_with(executable: &Path, concurrency: usize, timeout: Duration, src: &str) -> Vec<Diagnostic> {
    let mut options = LintOptions {
        shellcheck: Some(BridgeOptions {
            executable: executable.to_string_lossy().to_string(),
            concurrency,
            timeout,
        }),
        ..LintOptions::default()
    };
    for id in wflint::rules::rule_ids() {
        if id != shellcheck::RULE {
            options.disabled_rules.insert(id.to_string());
        }
    }
    let linter = Linter::new(options).unwrap();
    assert!(linter.has_bridge(), "fake checker should be usable");
    linter.lint_source(Path::new("ci.yaml"), src).diagnostics
}

/// Helper: write an executable shell script into `dir`.
#[cfg(unix)]
fn fake_checker(dir: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-shellcheck");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ── availability ──────────────────────────────────────────────────────────────

#[test]
fn missing_executable_disables_bridge() {
    assert!(!shellcheck::is_available(""));
    assert!(!shellcheck::is_available("/definitely/not/here/shellcheck"));
    assert!(!shellcheck::is_available("wflint-no-such-tool-on-path"));

    let options = LintOptions {
        shellcheck: Some(BridgeOptions {
            executable: "wflint-no-such-tool-on-path".to_string(),
            concurrency: 1,
            timeout: Duration::from_secs(5),
        }),
        ..LintOptions::default()
    };
    let linter = Linter::new(options).unwrap();
    assert!(!linter.has_bridge());
    let report = linter.lint_source(Path::new("ci.yaml"), TWO_SCRIPTS);
    assert!(report.diagnostics.iter().all(|d| d.rule_id != shellcheck::RULE));
}

// ── finding mapping ───────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn findings_are_remapped_to_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let checker = fake_checker(
        dir.path(),
        r#"cat > /dev/null
echo '[{"file":"-","line":1,"column":6,"level":"info","code":2086,"message":"Double quote to prevent globbing and word splitting."}]'
exit 1"#,
    );
    let d = lint_with(&checker, 2, Duration::from_secs(10), TWO_SCRIPTS);

    // identical scripts and findings, but two anchors
    assert_eq!(d.len(), 2, "{d:?}");
    assert_eq!((d[0].line, d[0].column), (6, 19));
    assert_eq!((d[1].line, d[1].column), (7, 19));
    assert_eq!(d[0].severity, Severity::Info);
    assert_eq!(
        d[0].message,
        "shellcheck reported issue in this script: SC2086:info:1:6: Double quote to prevent globbing and word splitting."
    );
}

#[cfg(unix)]
#[test]
fn expressions_are_masked_before_sending() {
    let dir = tempfile::tempdir().unwrap();
    let seen = dir.path().join("seen.txt");
    let checker = fake_checker(dir.path(), &format!("cat > '{}'\necho '[]'", seen.display()));
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo ${{ github.sha }} done\n";
    let d = lint_with(&checker, 1, Duration::from_secs(10), src);
    assert!(d.is_empty(), "{d:?}");

    let sent = std::fs::read_to_string(&seen).unwrap();
    assert_eq!(sent, "echo _________________ done");
}

#[cfg(unix)]
#[test]
fn non_shell_scripts_are_not_sent() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("called");
    let checker = fake_checker(dir.path(), &format!("touch '{}'\necho '[]'", marker.display()));
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: print(1)\n        shell: python\n";
    let d = lint_with(&checker, 1, Duration::from_secs(10), src);
    assert!(d.is_empty());
    assert!(!marker.exists());
}

// ── failures ──────────────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn timeout_becomes_one_diagnostic_per_script() {
    let dir = tempfile::tempdir().unwrap();
    let checker = fake_checker(dir.path(), "exec sleep 30");
    let started = std::time::Instant::now();
    let d = lint_with(&checker, 2, Duration::from_millis(300), TWO_SCRIPTS);
    assert!(started.elapsed() < Duration::from_secs(20));

    assert_eq!(d.len(), 2, "{d:?}");
    for diag in &d {
        assert_eq!(diag.rule_id, shellcheck::RULE);
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.message.starts_with("shellcheck did not finish"), "{}", diag.message);
    }
}

#[cfg(unix)]
#[test]
fn failing_checker_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let checker = fake_checker(dir.path(), "cat > /dev/null\nexit 3");
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    needs: missing\n    steps:\n      - run: echo hi\n";

    let options = LintOptions {
        shellcheck: Some(BridgeOptions {
            executable: checker.to_string_lossy().to_string(),
            concurrency: 1,
            timeout: Duration::from_secs(10),
        }),
        ..LintOptions::default()
    };
    let report = Linter::new(options)
        .unwrap()
        .lint_source(Path::new("ci.yaml"), src);

    // the rules still ran
    assert!(report.diagnostics.iter().any(|d| d.rule_id == "job-needs"));
    let sc: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.rule_id == shellcheck::RULE)
        .collect();
    assert_eq!(sc.len(), 1);
    assert!(sc[0].message.starts_with("shellcheck exited with"));
    assert_eq!(sc[0].line, 7);
}

#[cfg(unix)]
#[test]
fn malformed_output_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let checker = fake_checker(dir.path(), "cat > /dev/null\necho 'not json'\nexit 1");
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hi\n";
    let d = lint_with(&checker, 1, Duration::from_secs(10), src);
    assert_eq!(d.len(), 1);
    assert!(d[0].message.starts_with("shellcheck produced output that is not valid JSON"));
}

// ── concurrency bound ─────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn worker_pool_bounds_concurrent_processes() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let checker = fake_checker(
        dir.path(),
        &format!(
            "cat > /dev/null\necho start >> '{log}'\nsleep 0.2\necho end >> '{log}'\necho '[]'",
            log = log.display()
        ),
    );

    let mut src = String::from("on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n");
    for i in 0..8 {
        src.push_str(&format!("      - run: echo {i}\n"));
    }
    let d = lint_with(&checker, 2, Duration::from_secs(30), &src);
    assert!(d.is_empty(), "{d:?}");

    let events = std::fs::read_to_string(&log).unwrap();
    let mut running = 0i32;
    let mut peak = 0i32;
    for line in events.lines() {
        match line {
            "start" => running += 1,
            "end" => running -= 1,
            _ => {}
        }
        peak = peak.max(running);
    }
    assert_eq!(events.lines().filter(|l| *l == "start").count(), 8);
    assert!(peak <= 2, "peak concurrency was {peak}");
}

// ── real tool ─────────────────────────────────────────────────────────────────

#[test]
fn real_shellcheck_reports_unquoted_variable() {
    if !shellcheck::is_available("shellcheck") {
        return;
    }
    let d = lint_with(
        Path::new("shellcheck"),
        1,
        Duration::from_secs(30),
        "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: rm -rf $DIR/*\n",
    );
    assert!(d.iter().any(|x| x.message.contains("SC2086")), "{d:?}");
}
