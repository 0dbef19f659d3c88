//! Trigger checks: event names, activity types, filters, cron schedules and
//! `workflow_dispatch` inputs.

use super::{Rule, RuleInfo};
use crate::ast::{DispatchEvent, Event, Filter, InputType, ScheduleEvent, Str, WebhookEvent};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

const RULE: &str = "events";

/// Shortest allowed interval between two scheduled runs, in minutes.
pub const MIN_CRON_INTERVAL: u32 = 5;

const PR_TYPES: &[&str] = &[
    "assigned",
    "unassigned",
    "labeled",
    "unlabeled",
    "opened",
    "edited",
    "closed",
    "reopened",
    "synchronize",
    "converted_to_draft",
    "ready_for_review",
    "locked",
    "unlocked",
    "review_requested",
    "review_request_removed",
    "auto_merge_enabled",
    "auto_merge_disabled",
    "milestoned",
    "demilestoned",
    "enqueued",
    "dequeued",
];

/// Webhook events and their activity types. `None` means any type is
/// accepted; an empty list means the event has no activity types.
const WEBHOOK_EVENTS: &[(&str, Option<&[&str]>)] = &[
    ("branch_protection_rule", Some(&["created", "edited", "deleted"])),
    ("check_run", Some(&["created", "rerequested", "completed", "requested_action"])),
    ("check_suite", Some(&["completed"])),
    ("create", Some(&[])),
    ("delete", Some(&[])),
    ("deployment", Some(&[])),
    ("deployment_status", Some(&[])),
    (
        "discussion",
        Some(&[
            "created",
            "edited",
            "deleted",
            "transferred",
            "pinned",
            "unpinned",
            "labeled",
            "unlabeled",
            "locked",
            "unlocked",
            "category_changed",
            "answered",
            "unanswered",
        ]),
    ),
    ("discussion_comment", Some(&["created", "edited", "deleted"])),
    ("fork", Some(&[])),
    ("gollum", Some(&[])),
    ("image_version", Some(&["created", "ready"])),
    ("issue_comment", Some(&["created", "edited", "deleted"])),
    (
        "issues",
        Some(&[
            "opened",
            "edited",
            "deleted",
            "transferred",
            "pinned",
            "unpinned",
            "closed",
            "reopened",
            "assigned",
            "unassigned",
            "labeled",
            "unlabeled",
            "locked",
            "unlocked",
            "milestoned",
            "demilestoned",
            "typed",
            "untyped",
        ]),
    ),
    ("label", Some(&["created", "edited", "deleted"])),
    ("merge_group", Some(&["checks_requested"])),
    ("milestone", Some(&["created", "closed", "opened", "edited", "deleted"])),
    ("page_build", Some(&[])),
    ("project", Some(&["created", "closed", "reopened", "edited", "deleted"])),
    ("project_card", Some(&["created", "moved", "converted", "edited", "deleted"])),
    ("project_column", Some(&["created", "updated", "moved", "deleted"])),
    ("public", Some(&[])),
    ("pull_request", Some(PR_TYPES)),
    ("pull_request_review", Some(&["submitted", "edited", "dismissed"])),
    ("pull_request_review_comment", Some(&["created", "edited", "deleted"])),
    ("pull_request_target", Some(PR_TYPES)),
    ("push", Some(&[])),
    ("registry_package", Some(&["published", "updated"])),
    (
        "release",
        Some(&[
            "published",
            "unpublished",
            "created",
            "edited",
            "deleted",
            "prereleased",
            "released",
        ]),
    ),
    ("repository_dispatch", None),
    ("status", Some(&[])),
    ("watch", Some(&["started"])),
    ("workflow_run", Some(&["completed", "requested", "in_progress"])),
];

pub struct EventsRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Triggers: unknown events and activity types, conflicting or unsupported filters, invalid cron schedules and workflow_dispatch inputs",
        remediation: "Use documented event names and types, do not combine a filter with its \"-ignore\" variant, and schedule runs at most every 5 minutes",
    }
}

impl Rule for EventsRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Workflow triggers"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for event in &doc.workflow.on {
            match event {
                Event::Webhook(w) => check_webhook(doc, w, &mut out),
                Event::Schedule(s) => check_schedule(doc, s, &mut out),
                Event::WorkflowDispatch(d) => check_dispatch(doc, d, &mut out),
                Event::WorkflowCall(_) => {}
            }
        }
        out
    }
}

fn quoted(items: &[&str]) -> String {
    items
        .iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_webhook(doc: &Document, w: &WebhookEvent, out: &mut Vec<Diagnostic>) {
    let name = w.name.value.as_str();
    let Some((_, types)) = WEBHOOK_EVENTS.iter().find(|(n, _)| *n == name) else {
        out.push(doc.error(
            RULE,
            w.name.pos,
            format!(
                "unknown Webhook event {:?}. see https://docs.github.com/en/actions/using-workflows/events-that-trigger-workflows#webhook-events for list of all Webhook event names",
                name
            ),
        ));
        return;
    };

    match types {
        Some([]) => {
            if let Some(first) = w.types.first() {
                out.push(doc.error(
                    RULE,
                    first.pos,
                    format!("\"types\" filter is not available for event {name:?}"),
                ));
            }
        }
        Some(allowed) => {
            for t in &w.types {
                if !t.contains_expression() && !allowed.contains(&t.value.as_str()) {
                    out.push(doc.error(
                        RULE,
                        t.pos,
                        format!(
                            "invalid activity type {:?} for {:?} Webhook event. available types are {}",
                            t.value,
                            name,
                            quoted(allowed)
                        ),
                    ));
                }
            }
        }
        None => {}
    }

    let branches_ok = matches!(
        name,
        "push" | "pull_request" | "pull_request_target" | "workflow_run" | "merge_group"
    );
    let paths_ok = matches!(name, "push" | "pull_request" | "pull_request_target");
    let tags_ok = name == "push";
    for (filter, ok) in [
        (&w.branches, branches_ok),
        (&w.branches_ignore, branches_ok),
        (&w.tags, tags_ok),
        (&w.tags_ignore, tags_ok),
        (&w.paths, paths_ok),
        (&w.paths_ignore, paths_ok),
    ] {
        if let (Some(f), false) = (filter, ok) {
            out.push(doc.error(
                RULE,
                f.name.pos,
                format!("{:?} filter is not available for {:?} event", f.name.value, name),
            ));
        }
    }

    conflict(doc, name, &w.branches, &w.branches_ignore, out);
    conflict(doc, name, &w.tags, &w.tags_ignore, out);
    conflict(doc, name, &w.paths, &w.paths_ignore, out);

    if name == "workflow_run" && w.workflows.is_empty() {
        out.push(doc.error(
            RULE,
            w.name.pos,
            "no workflow is configured for \"workflow_run\" event. use \"workflows\" filter",
        ));
    }
    if name != "workflow_run" {
        if let Some(first) = w.workflows.first() {
            out.push(doc.error(
                RULE,
                first.pos,
                format!("\"workflows\" filter is not available for {name:?} event"),
            ));
        }
    }
}

fn conflict(
    doc: &Document,
    event: &str,
    filter: &Option<Filter>,
    ignore: &Option<Filter>,
    out: &mut Vec<Diagnostic>,
) {
    if let (Some(f), Some(i)) = (filter, ignore) {
        out.push(doc.error(
            RULE,
            i.name.pos,
            format!(
                "both {:?} and {:?} filters cannot be used for the same event {:?}. note: use '!' to negate patterns",
                f.name.value, i.name.value, event
            ),
        ));
    }
}

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAYS: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Values a single cron field matches.
fn cron_field(field: &str, min: u32, max: u32, names: &[&str]) -> Result<Vec<u32>, String> {
    let value = |s: &str| -> Result<u32, String> {
        if let Some(i) = names.iter().position(|n| n.eq_ignore_ascii_case(s)) {
            return Ok(min + i as u32);
        }
        let n: u32 = s
            .parse()
            .map_err(|_| format!("{s:?} is not a number"))?;
        if n < min || n > max {
            return Err(format!("{n} is out of range {min}-{max}"));
        }
        Ok(n)
    };

    let mut out = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| format!("step {s:?} is not a number"))?;
                if step == 0 {
                    return Err("step must not be zero".to_string());
                }
                (r, step)
            }
            None => (part, 1),
        };
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(a)?, value(b)?)
        } else {
            let v = value(range)?;
            // `5/15` means from 5 to the end in steps of 15
            (v, if step > 1 { max } else { v })
        };
        if lo > hi {
            return Err(format!("range {part:?} is reversed"));
        }
        out.extend((lo..=hi).step_by(step as usize));
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Shortest gap between two runs in minutes, looking at the minute field
/// and whether the hour field lets the schedule wrap into the next hour.
fn shortest_interval(minutes: &[u32], hours: &[u32]) -> Option<u32> {
    let mut gaps: Vec<u32> = minutes.windows(2).map(|w| w[1] - w[0]).collect();
    if hours.windows(2).any(|w| w[1] - w[0] == 1) {
        if let (Some(first), Some(last)) = (minutes.first(), minutes.last()) {
            gaps.push(60 - last + first);
        }
    }
    gaps.into_iter().min()
}

fn check_cron(cron: &Str) -> Result<(), String> {
    let fields: Vec<&str> = cron.value.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 fields (minute, hour, day of month, month, day of week) but found {}",
            fields.len()
        ));
    }
    let minutes = cron_field(fields[0], 0, 59, &[])?;
    let hours = cron_field(fields[1], 0, 23, &[])?;
    cron_field(fields[2], 1, 31, &[])?;
    cron_field(fields[3], 1, 12, MONTHS)?;
    cron_field(fields[4], 0, 6, WEEKDAYS)?;

    if let Some(gap) = shortest_interval(&minutes, &hours) {
        if gap < MIN_CRON_INTERVAL {
            return Err(format!(
                "scheduled job runs too frequently. it runs once per {} minutes. the shortest interval is once every {} minutes",
                gap, MIN_CRON_INTERVAL
            ));
        }
    }
    Ok(())
}

fn check_schedule(doc: &Document, s: &ScheduleEvent, out: &mut Vec<Diagnostic>) {
    if s.cron.is_empty() {
        out.push(doc.error(RULE, s.pos, "\"schedule\" event must have at least one \"cron\" entry"));
    }
    for cron in &s.cron {
        if let Err(reason) = check_cron(cron) {
            out.push(doc.error(
                RULE,
                cron.pos,
                format!("invalid CRON format {:?} in schedule event: {}", cron.value, reason),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// workflow_dispatch
// ---------------------------------------------------------------------------

fn check_dispatch(doc: &Document, d: &DispatchEvent, out: &mut Vec<Diagnostic>) {
    for input in &d.inputs {
        let name = &input.name.value;
        match input.input_type {
            InputType::Choice => {
                if input.options.is_empty() {
                    out.push(doc.error(
                        RULE,
                        input.name.pos,
                        format!("input {name:?} of \"choice\" type must have \"options\" and it must not be empty"),
                    ));
                }
                if let Some(def) = &input.default {
                    if !input.options.iter().any(|o| o.value == def.value) {
                        let options = input
                            .options
                            .iter()
                            .map(|o| format!("{:?}", o.value))
                            .collect::<Vec<_>>()
                            .join(", ");
                        out.push(doc.error(
                            RULE,
                            def.pos,
                            format!(
                                "default value {:?} of input {:?} must be included in its options [{}]",
                                def.value, name, options
                            ),
                        ));
                    }
                }
                let mut seen: Vec<&str> = Vec::new();
                for o in &input.options {
                    if seen.contains(&o.value.as_str()) {
                        out.push(doc.error(
                            RULE,
                            o.pos,
                            format!("option {:?} is duplicated in options of input {:?}", o.value, name),
                        ));
                    } else {
                        seen.push(&o.value);
                    }
                }
            }
            InputType::Boolean => {
                if let Some(def) = &input.default {
                    if def.value != "true" && def.value != "false" {
                        out.push(doc.error(
                            RULE,
                            def.pos,
                            format!(
                                "type of input {:?} is \"boolean\". its default value {:?} must be \"true\" or \"false\"",
                                name, def.value
                            ),
                        ));
                    }
                }
            }
            InputType::Number => {
                if let Some(def) = &input.default {
                    if def.value.parse::<f64>().is_err() {
                        out.push(doc.error(
                            RULE,
                            def.pos,
                            format!(
                                "type of input {:?} is \"number\" but its default value {:?} cannot be parsed as a number",
                                name, def.value
                            ),
                        ));
                    }
                }
            }
            InputType::String | InputType::Environment => {}
        }
    }
}
