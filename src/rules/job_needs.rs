//! Job dependency graph checks.
//!
//! Reports `needs` entries that name a job which does not exist, duplicated
//! entries, and cycles. For cycles, every job that lies on one is reported,
//! found as the non-trivial strongly connected components of the graph.

use super::{Rule, RuleInfo};
use crate::ast::Workflow;
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;
use std::collections::HashMap;

const RULE: &str = "job-needs";

pub struct JobNeedsRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Job dependencies: undefined or duplicated \"needs\" entries and dependency cycles",
        remediation: "Make every \"needs\" entry name an existing job and remove dependencies that form a cycle",
    }
}

impl Rule for JobNeedsRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Undefined needs, duplicate needs and dependency cycles"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let wf = &doc.workflow;
        let mut out = Vec::new();

        for job in &wf.jobs {
            let mut seen: HashMap<String, &crate::ast::Str> = HashMap::new();
            for need in &job.needs {
                let key = need.value.to_ascii_lowercase();
                if let Some(prev) = seen.get(&key) {
                    out.push(doc.error(
                        RULE,
                        need.pos,
                        format!(
                            "job ID {:?} duplicates in \"needs\" section of job {:?}. previously defined at line:{},col:{}. note that job ID is case insensitive",
                            need.value, job.id.value, prev.pos.line, prev.pos.col
                        ),
                    ));
                    continue;
                }
                seen.insert(key, need);
                if wf.job(&need.value).is_none() {
                    out.push(doc.error(
                        RULE,
                        need.pos,
                        format!(
                            "job {:?} needs job {:?} which does not exist in this workflow",
                            job.id.value, need.value
                        ),
                    ));
                }
            }
        }

        for component in cycles(wf) {
            let names = component
                .iter()
                .map(|&i| format!("{:?}", wf.jobs[i].id.value))
                .collect::<Vec<_>>()
                .join(", ");
            for &i in &component {
                let job = &wf.jobs[i];
                out.push(doc.error(
                    RULE,
                    job.id.pos,
                    format!(
                        "cyclic dependencies in \"needs\" job graph are detected. job {:?} is part of a cycle among jobs {}",
                        job.id.value, names
                    ),
                ));
            }
        }
        out
    }
}

/// Index-based adjacency list. Edges to undefined jobs are dropped and
/// duplicate edges collapsed.
fn graph(wf: &Workflow) -> Vec<Vec<usize>> {
    let index: HashMap<String, usize> = wf
        .jobs
        .iter()
        .enumerate()
        .map(|(i, j)| (j.id.value.to_ascii_lowercase(), i))
        .collect();
    wf.jobs
        .iter()
        .map(|job| {
            let mut edges: Vec<usize> = job
                .needs
                .iter()
                .filter_map(|n| index.get(&n.value.to_ascii_lowercase()).copied())
                .collect();
            edges.sort_unstable();
            edges.dedup();
            edges
        })
        .collect()
}

/// Job indexes of every cycle-carrying strongly connected component, each
/// sorted by document order. Uses Tarjan's algorithm.
pub fn cycles(wf: &Workflow) -> Vec<Vec<usize>> {
    let g = graph(wf);
    let mut t = Tarjan {
        graph: &g,
        index: vec![None; g.len()],
        low: vec![0; g.len()],
        on_stack: vec![false; g.len()],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in 0..g.len() {
        if t.index[v].is_none() {
            t.connect(v);
        }
    }
    let mut found: Vec<Vec<usize>> = t
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || g[c[0]].contains(&c[0]))
        .map(|mut c| {
            c.sort_unstable();
            c
        })
        .collect();
    found.sort();
    found
}

struct Tarjan<'g> {
    graph: &'g [Vec<usize>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    /// Iterative form of the recursive `strongconnect`, so a long chain of
    /// `needs` cannot exhaust the thread stack. Each frame is a vertex and
    /// the position of the next edge to visit.
    fn connect(&mut self, root: usize) {
        let graph = self.graph;
        let mut frames: Vec<(usize, usize)> = Vec::new();
        self.visit(root);
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let (v, edge) = *frame;
            if let Some(&w) = graph[v].get(edge) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.visit(w);
                        frames.push((w, 0));
                    }
                    Some(iw) if self.on_stack[w] => self.low[v] = self.low[v].min(iw),
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.low[parent] = self.low[parent].min(self.low[v]);
            }
            if Some(self.low[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    /// Each entry is `id` or `id:dep1,dep2`.
    fn workflow(jobs: &[&str]) -> String {
        let mut s = String::from("on: push\njobs:\n");
        for spec in jobs {
            let (id, needs) = spec.split_once(':').unwrap_or((spec, ""));
            s.push_str(&format!("  {id}:\n"));
            if !needs.is_empty() {
                s.push_str(&format!("    needs: [{needs}]\n"));
            }
            s.push_str("    runs-on: x\n    steps: [{run: a}]\n");
        }
        s
    }

    #[test]
    fn acyclic_graph_has_no_cycle_diagnostics() {
        let d = run_rule(
            &JobNeedsRule,
            &workflow(&["a", "b:a", "c:a,b"]),
        );
        assert!(d.is_empty(), "{d:?}");
    }

    #[test]
    fn every_job_on_a_cycle_is_reported() {
        let d = run_rule(
            &JobNeedsRule,
            &workflow(&["a:c", "b:a", "c:b", "d:a"]),
        );
        assert_eq!(d.len(), 3, "{d:?}");
        for id in ["\"a\"", "\"b\"", "\"c\""] {
            assert!(d.iter().any(|x| x.message.contains(&format!("job {id} is part"))));
        }
        assert!(!d.iter().any(|x| x.message.contains("job \"d\" is part")));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let d = run_rule(&JobNeedsRule, &workflow(&["a:a"]));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("cyclic"));
    }

    #[test]
    fn undefined_need_is_reported_once() {
        let d = run_rule(&JobNeedsRule, &workflow(&["b:a"]));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("does not exist"));
        assert!(!d[0].message.contains("cyclic"));
    }

    #[test]
    fn duplicate_needs() {
        let d = run_rule(&JobNeedsRule, &workflow(&["a", "b:a,A"]));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("duplicates"));
    }

    #[test]
    fn two_separate_cycles() {
        let d = run_rule(
            &JobNeedsRule,
            &workflow(&["a:b", "b:a", "c:d", "d:c"]),
        );
        assert_eq!(d.len(), 4);
    }

    #[test]
    fn long_needs_chain_does_not_exhaust_the_stack() {
        let n = 20_000;
        let mut jobs: Vec<String> = (1..n).map(|i| format!("j{i}:j{}", i - 1)).collect();
        jobs.insert(0, format!("j0:j{}", n - 1));
        let refs: Vec<&str> = jobs.iter().map(String::as_str).collect();
        let doc = crate::parse::parse(std::path::Path::new("chain.yaml"), &workflow(&refs))
            .expect("chain workflow should parse");

        let found = std::thread::scope(|s| {
            std::thread::Builder::new()
                .stack_size(256 * 1024)
                .spawn_scoped(s, || cycles(&doc.workflow))
                .expect("spawn")
                .join()
                .expect("cycle detection should not overflow")
        });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].len(), n);
    }
}
