//! SARIF 2.1.0 formatter.
//!
//! One run, a descriptor for every rule that reported something, and one
//! result per diagnostic with a physical location.

use crate::diagnostic::{Report, Severity};
use crate::rules::{self, RuleInfo};
use serde_sarif::sarif::{
    ArtifactLocation, Location, Message, MultiformatMessageString, PhysicalLocation, Region,
    ReportingDescriptor, Result as SarifResult, ResultLevel, Run, Sarif, Tool, ToolComponent,
};
use std::collections::BTreeMap;

const SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const INFORMATION_URI: &str =
    "https://docs.github.com/en/actions/using-workflows/workflow-syntax-for-github-actions";

/// Formats reports as a SARIF 2.1.0 log.
///
/// # Panics
///
/// Panics if the log cannot be serialized (should not happen with valid data).
pub fn format(reports: &[Report]) -> String {
    let known: BTreeMap<&str, RuleInfo> = rules::all_rule_info()
        .into_iter()
        .map(|info| (info.id, info))
        .collect();

    let mut rule_ids: Vec<&str> = reports
        .iter()
        .flat_map(|r| &r.diagnostics)
        .map(|d| d.rule_id.as_str())
        .collect();
    rule_ids.sort_unstable();
    rule_ids.dedup();

    let rule_index: BTreeMap<&str, i64> = rule_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i as i64))
        .collect();

    let descriptors: Vec<ReportingDescriptor> = rule_ids
        .iter()
        .map(|id| {
            let mut rule = ReportingDescriptor::builder().id(id.to_string()).build();
            let summary = known.get(id).map_or(*id, |info| info.message);
            rule.short_description = Some(
                MultiformatMessageString::builder()
                    .text(summary.to_string())
                    .build(),
            );
            if let Some(info) = known.get(id) {
                rule.help = Some(
                    MultiformatMessageString::builder()
                        .text(info.remediation.to_string())
                        .build(),
                );
            }
            rule
        })
        .collect();

    let results: Vec<SarifResult> = reports
        .iter()
        .flat_map(|r| &r.diagnostics)
        .map(|d| {
            let level = match d.severity {
                Severity::Error => ResultLevel::Error,
                Severity::Warning => ResultLevel::Warning,
                Severity::Info => ResultLevel::Note,
            };

            let mut result = SarifResult::builder()
                .message(Message::builder().text(d.message.clone()).build())
                .build();
            result.rule_id = Some(d.rule_id.clone());
            result.level = Some(level);
            result.rule_index = rule_index.get(d.rule_id.as_str()).copied();

            let uri = d.file.to_string_lossy().replace('\\', "/");
            let mut physical = PhysicalLocation::builder().build();
            physical.artifact_location = Some(ArtifactLocation::builder().uri(uri).build());
            physical.region = Some(
                Region::builder()
                    .start_line(d.line.max(1) as i64)
                    .start_column(d.column.max(1) as i64)
                    .build(),
            );

            let mut location = Location::builder().build();
            location.physical_location = Some(physical);
            result.locations = Some(vec![location]);
            result
        })
        .collect();

    let mut driver = ToolComponent::builder()
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION").to_string())
        .rules(descriptors)
        .build();
    driver.information_uri = Some(INFORMATION_URI.to_string());

    let tool = Tool::builder().driver(driver).build();
    let run = Run::builder().tool(tool).results(results).build();

    let mut sarif = Sarif::builder().version("2.1.0").runs(vec![run]).build();
    sarif.schema = Some(SCHEMA.to_string());

    let mut out = serde_json::to_string_pretty(&sarif).expect("SARIF serialization failed");
    out.push('\n');
    out
}
