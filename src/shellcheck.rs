//! Script checks via [ShellCheck](https://www.shellcheck.net/).
//!
//! This is the only component that leaves the process: every `run:` script
//! written for `bash` or `sh` is piped into an external `shellcheck` and its
//! JSON findings are mapped back to positions in the workflow file.
//!
//! # How it works
//!
//! 1. [`scripts`] collects run steps and resolves their shell (step `shell`,
//!    then job and workflow `defaults.run.shell`, then the runner default).
//!    Scripts for any other shell are skipped silently.
//! 2. `${{ }}` placeholders are masked with underscores of the same length so
//!    ShellCheck sees valid shell and columns stay aligned.
//! 3. Each script runs as
//!    `shellcheck --norc -f json -x --shell <sh> -e <excluded> -` on a
//!    [`WorkerPool`] thread. The pool has a fixed number of threads and each
//!    invocation holds one for its whole lifetime, so no more than that many
//!    processes exist at once no matter how many documents are linted.
//! 4. Every invocation has a deadline. A timeout, a spawn failure or output
//!    that is not ShellCheck JSON becomes one `shellcheck` diagnostic at the
//!    script; the rest of the document is unaffected.

use crate::ast::{Job, Pos, Step, Str, Workflow};
use crate::diagnostic::{Diagnostic, Severity};
use crate::expr::mask_expressions;
use crate::parse::Document;
use crate::rules::RuleInfo;
use rayon::prelude::*;
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

pub const RULE: &str = "shellcheck";

/// Checks that only produce false positives on workflow scripts: sourcing
/// files that are not there yet (SC1091), constant `case`/`[[ ]]` operands
/// left behind by masked placeholders (SC2194, SC2050), variables set by the
/// runner (SC2154) and masked placeholders compared with strings (SC2157).
const EXCLUDED_CHECKS: &str = "SC1091,SC2194,SC2050,SC2154,SC2157";

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "warning",
        message: "Findings of shellcheck in run scripts, and failures to run it",
        remediation: "See https://www.shellcheck.net/wiki/ for the reported SC code",
    }
}

/// Failure of a single shellcheck invocation or of setting up the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("shellcheck could not be started ({executable}): {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("shellcheck did not finish within {0:?} and was stopped")]
    Timeout(Duration),

    #[error("shellcheck failed while running: {0}")]
    Io(#[from] std::io::Error),

    #[error("shellcheck exited with {status} without reporting findings")]
    Status { status: std::process::ExitStatus },

    #[error("shellcheck produced output that is not valid JSON: {0}")]
    Output(#[from] serde_json::Error),

    #[error("shellcheck worker pool could not be created: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Fixed-size pool for external invocations.
///
/// Backed by a dedicated [`rayon::ThreadPool`]. Work submitted with
/// [`run`](WorkerPool::run) executes on the pool's own threads only, so the
/// pool size is an upper bound on concurrently running tasks even when many
/// callers submit at once.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, BridgeError> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("wflint-shellcheck-{i}"))
            .build()?;
        Ok(WorkerPool { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` over `items` on the pool and returns the results in input
    /// order. Blocks the caller until every item is done.
    pub fn run<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        self.pool.install(|| items.into_par_iter().map(f).collect())
    }
}

// ---------------------------------------------------------------------------
// Script extraction
// ---------------------------------------------------------------------------

/// A run script that shellcheck can check.
#[derive(Debug, Clone, Copy)]
pub struct Script<'a> {
    pub source: &'a Str,
    /// `bash` or `sh`.
    pub shell: &'static str,
}

/// Shell a run step executes with, or `None` when it is not one shellcheck
/// understands.
pub fn resolve_shell(wf: &Workflow, job: &Job, step: &Step) -> Option<&'static str> {
    let explicit = step
        .run
        .as_ref()
        .and_then(|r| r.shell.as_ref())
        .or_else(|| job.defaults.as_ref().and_then(|d| d.shell.as_ref()))
        .or_else(|| wf.defaults.as_ref().and_then(|d| d.shell.as_ref()));

    match explicit {
        Some(shell) if shell.contains_expression() => None,
        Some(shell) => match shell.value.split_whitespace().next() {
            Some("bash") => Some("bash"),
            Some("sh") => Some("sh"),
            _ => None,
        },
        // the default shell on Windows runners is pwsh
        None if job.runs_on_windows() => None,
        None => Some("bash"),
    }
}

/// Every run script in `doc` with a shell shellcheck supports.
pub fn scripts(doc: &Document) -> Vec<Script<'_>> {
    let wf = &doc.workflow;
    let mut out = Vec::new();
    for job in &wf.jobs {
        for step in &job.steps {
            let Some(run) = &step.run else {
                continue;
            };
            if let Some(shell) = resolve_shell(wf, job, step) {
                out.push(Script {
                    source: &run.run,
                    shell,
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Output mapping
// ---------------------------------------------------------------------------

/// One entry of `shellcheck -f json` output.
#[derive(Debug, Deserialize)]
struct Finding {
    #[serde(default)]
    line: usize,
    #[serde(default)]
    column: usize,
    #[serde(default)]
    level: String,
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

/// Maps shellcheck JSON for `script` to document diagnostics.
pub fn parse_output(doc: &Document, script: &Str, stdout: &str) -> Result<Vec<Diagnostic>, BridgeError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let findings: Vec<Finding> = serde_json::from_str(stdout)?;
    Ok(findings
        .into_iter()
        // real codes are >= 1000; zero means the entry is malformed
        .filter(|f| f.code > 0)
        .map(|f| {
            let severity = match f.level.as_str() {
                "error" => Severity::Error,
                "warning" => Severity::Warning,
                _ => Severity::Info,
            };
            let pos = Pos::new(
                script.pos.line + f.line.saturating_sub(1),
                script.pos.col + f.column.saturating_sub(1),
            );
            doc.diag(
                RULE,
                severity,
                pos,
                format!(
                    "shellcheck reported issue in this script: SC{}:{}:{}:{}: {}",
                    f.code, f.level, f.line, f.column, f.message
                ),
            )
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub executable: String,
    pub concurrency: usize,
    pub timeout: Duration,
}

/// Runs shellcheck over the scripts of a document.
///
/// Cheap to share: all documents linted by one
/// [`Linter`](crate::lint::Linter) go through the same pool.
pub struct Bridge {
    executable: String,
    timeout: Duration,
    pool: Arc<WorkerPool>,
}

impl Bridge {
    pub fn new(opts: &BridgeOptions) -> Result<Self, BridgeError> {
        Ok(Bridge {
            executable: opts.executable.clone(),
            timeout: opts.timeout,
            pool: Arc::new(WorkerPool::new(opts.concurrency)?),
        })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn concurrency(&self) -> usize {
        self.pool.size()
    }

    pub fn check(&self, doc: &Document) -> Vec<Diagnostic> {
        let scripts = scripts(doc);
        if scripts.is_empty() {
            return Vec::new();
        }
        tracing::debug!(
            path = %doc.path.display(),
            scripts = scripts.len(),
            "running shellcheck"
        );
        self.pool
            .run(scripts, |script| {
                let result = self
                    .invoke(&mask_expressions(&script.source.value), script.shell)
                    .and_then(|stdout| parse_output(doc, script.source, &stdout));
                match result {
                    Ok(diags) => diags,
                    Err(e) => {
                        tracing::warn!(
                            path = %doc.path.display(),
                            line = script.source.pos.line,
                            error = %e,
                            "shellcheck invocation failed"
                        );
                        vec![doc.error(RULE, script.source.pos, e.to_string())]
                    }
                }
            })
            .into_iter()
            .flatten()
            .collect()
    }

    /// Runs one shellcheck process over `script` and returns its stdout.
    fn invoke(&self, script: &str, shell: &str) -> Result<String, BridgeError> {
        let start = Instant::now();
        let mut child = Command::new(&self.executable)
            .args(["--norc", "-f", "json", "-x", "--shell", shell, "-e", EXCLUDED_CHECKS, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;

        // Feed stdin and drain stdout off this thread so that neither side
        // can block on a full pipe while we wait for the deadline.
        let stdin = child.stdin.take();
        let input = script.to_string();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // the child may exit without reading; that is not an error here
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut buf);
            }
            buf
        });

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(timeout = ?self.timeout, "shellcheck timed out");
                // the helper threads finish once the pipes close
                return Err(BridgeError::Timeout(self.timeout));
            }
        };
        let _ = writer.join();
        let stdout = reader.join().unwrap_or_default();
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = %status,
            "shellcheck finished"
        );

        // exit status 1 means "found issues"; anything else without output
        // means shellcheck itself failed
        if stdout.trim().is_empty() && !matches!(status.code(), Some(0) | Some(1)) {
            return Err(BridgeError::Status { status });
        }
        Ok(stdout)
    }
}

/// Returns `true` if `executable` names an existing executable file, either
/// as a path or by lookup in `PATH`.
pub fn is_available(executable: &str) -> bool {
    if executable.is_empty() {
        return false;
    }
    let path = Path::new(executable);
    if path.components().count() > 1 {
        return is_executable(path);
    }
    std::env::var_os("PATH")
        .map(|dirs| std::env::split_paths(&dirs).any(|dir| is_executable(&dir.join(executable))))
        .unwrap_or(false)
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn doc(src: &str) -> Document {
        parse(Path::new("sc.yaml"), src).unwrap()
    }

    #[test]
    fn shell_resolution_order() {
        let d = doc("on: push\ndefaults:\n  run:\n    shell: sh\njobs:\n  a:\n    runs-on: ubuntu-latest\n    defaults:\n      run:\n        shell: python\n    steps:\n      - run: a\n      - run: b\n        shell: bash -e {0}\n  b:\n    runs-on: ubuntu-latest\n    steps:\n      - run: c\n");
        let wf = &d.workflow;
        assert_eq!(resolve_shell(wf, &wf.jobs[0], &wf.jobs[0].steps[0]), None);
        assert_eq!(resolve_shell(wf, &wf.jobs[0], &wf.jobs[0].steps[1]), Some("bash"));
        assert_eq!(resolve_shell(wf, &wf.jobs[1], &wf.jobs[1].steps[0]), Some("sh"));
    }

    #[test]
    fn windows_default_is_skipped() {
        let d = doc("on: push\njobs:\n  a:\n    runs-on: windows-latest\n    steps:\n      - run: dir\n      - run: ls\n        shell: bash\n");
        let s = scripts(&d);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].source.value, "ls");
    }

    #[test]
    fn findings_are_mapped_to_document_positions() {
        let d = doc("on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: |\n          echo ok\n          echo $foo\n");
        let script = &d.workflow.jobs[0].steps[0].run.as_ref().unwrap().run;
        let out = r#"[{"file":"-","line":2,"endLine":2,"column":6,"endColumn":10,"level":"info","code":2086,"message":"Double quote to prevent globbing and word splitting."},{"line":1,"column":1,"level":"error","code":0,"message":"bogus"}]"#;
        let diags = parse_output(&d, script, out).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 8);
        assert_eq!(diags[0].column, 16);
        assert_eq!(diags[0].severity, Severity::Info);
        assert!(diags[0]
            .message
            .starts_with("shellcheck reported issue in this script: SC2086:info:2:6: "));
    }

    #[test]
    fn malformed_output_is_an_error() {
        let d = doc("on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: echo\n");
        let script = &d.workflow.jobs[0].steps[0].run.as_ref().unwrap().run;
        let err = parse_output(&d, script, "not json").unwrap_err();
        assert!(err.to_string().starts_with("shellcheck"));
    }

    #[test]
    fn pool_size_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).unwrap().size(), 1);
    }

    #[test]
    fn missing_executable_is_not_available() {
        assert!(!is_available(""));
        assert!(!is_available("/definitely/not/here/shellcheck"));
    }
}
