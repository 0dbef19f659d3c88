use std::path::Path;

use wflint::config::LintOptions;
use wflint::diagnostic::Diagnostic;
use wflint::lint::Linter;

/// Helper: lint a document with every rule and no external tools.
fn lint(src: &str) -> Vec<Diagnostic> {
    let options = LintOptions {
        shellcheck: None,
        ..LintOptions::default()
    };
    Linter::new(options)
        .unwrap()
        .lint_source(Path::new("workflow.yaml"), src)
        .diagnostics
}

fn rules_of(diags: &[Diagnostic]) -> Vec<&str> {
    diags.iter().map(|d| d.rule_id.as_str()).collect()
}

// ── clean documents ───────────────────────────────────────────────────────────

#[test]
fn minimal_workflow_is_clean() {
    let d = lint("on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hi\n");
    assert!(d.is_empty(), "{d:?}");
}

#[test]
fn realistic_workflow_is_clean() {
    let src = std::fs::read_to_string("tests/fixtures/clean.yaml").unwrap();
    let d = lint(&src);
    assert!(d.is_empty(), "{d:?}");
}

// ── job graph ─────────────────────────────────────────────────────────────────

#[test]
fn undefined_need_is_reported_once() {
    let d = lint("on: push\njobs:\n  a:\n    needs: nope\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n");
    assert_eq!(d.len(), 1, "{d:?}");
    assert_eq!(d[0].rule_id, "job-needs");
    assert!(d[0].message.contains("\"nope\""));
    assert_eq!(d[0].line, 4);
}

#[test]
fn cycle_is_reported_but_document_is_still_checked() {
    let src = "on: push\njobs:\n  a:\n    needs: b\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo ${{ nope.x }}\n  b:\n    needs: a\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n";
    let d = lint(src);
    let rules = rules_of(&d);
    assert!(rules.contains(&"job-needs"), "{d:?}");
    assert!(rules.contains(&"expression"), "{d:?}");
    assert!(d.iter().any(|x| x.message.contains("cyclic dependencies")));
}

// ── expressions ───────────────────────────────────────────────────────────────

#[test]
fn context_not_available_at_job_if() {
    let src = "on: push\njobs:\n  a:\n    if: ${{ steps.x.outcome == 'success' }}\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n";
    let d = lint(src);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.starts_with("context \"steps\" is not allowed here"));
    assert_eq!(d[0].line, 4);
    assert_eq!(d[0].column, 13);
}

#[test]
fn needs_outputs_are_typed() {
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    outputs:\n      v: ${{ steps.s.outputs.v }}\n    steps:\n      - id: s\n        run: echo\n  b:\n    needs: a\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo ${{ needs.a.outputs.v }} ${{ needs.a.outputs.w }}\n";
    let d = lint(src);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.contains("property \"w\" is not defined"));
}

#[test]
fn matrix_properties_are_typed() {
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    strategy:\n      matrix:\n        os: [a, b]\n    steps:\n      - run: echo ${{ matrix.os }} ${{ matrix.arch }}\n";
    let d = lint(src);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.contains("property \"arch\" is not defined"));
}

#[test]
fn untrusted_input_in_run() {
    let src = "on: pull_request\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo \"${{ github.event.pull_request.title }}\"\n";
    let d = lint(src);
    assert_eq!(d.len(), 1, "{d:?}");
    assert!(d[0].message.contains("potentially untrusted"));
}

#[test]
fn deeply_nested_expression_is_one_diagnostic() {
    let expr = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let src = format!(
        "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo ${{{{ {expr} }}}}\n"
    );
    let d = lint(&src);
    assert_eq!(rules_of(&d), vec!["expression"], "{d:?}");
    assert!(d[0].message.contains("nested too deeply"));
}

// ── other families ────────────────────────────────────────────────────────────

#[test]
fn unknown_event_and_bad_cron() {
    let src = "on:\n  pushh:\n  schedule:\n    - cron: '* * * *'\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo\n";
    let d = lint(src);
    assert!(rules_of(&d).iter().all(|r| *r == "events"), "{d:?}");
    assert_eq!(d.len(), 2, "{d:?}");
}

#[test]
fn action_reference_without_ref() {
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout\n";
    let d = lint(src);
    assert_eq!(rules_of(&d), vec!["action"], "{d:?}");
}

#[test]
fn step_without_run_or_uses() {
    let src = "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - name: nothing\n";
    let d = lint(src);
    assert!(rules_of(&d).contains(&"syntax-check"), "{d:?}");
}

#[test]
fn diagnostics_are_sorted_by_position() {
    let src = std::fs::read_to_string("tests/fixtures/broken.yaml").unwrap();
    let d = lint(&src);
    assert!(d.len() >= 3, "{d:?}");
    let positions: Vec<_> = d.iter().map(|x| (x.line, x.column)).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
}

#[test]
fn every_diagnostic_has_a_snippet() {
    let src = std::fs::read_to_string("tests/fixtures/broken.yaml").unwrap();
    for d in lint(&src) {
        assert!(d.snippet.is_some(), "{d:?}");
    }
}
