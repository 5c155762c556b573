//! Text output for non-interactive runs.
//!
//! This module formats machine details, per-step progress and the final verdict as
//! human-readable lines for text mode.

use crate::model::{symbol_label, MachineDescriptor, RunStatus, RunTrace, Snapshot};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn describe_machine(machine: &str, descriptor: &MachineDescriptor) -> Vec<String> {
    let finals: Vec<&str> = descriptor.final_states.iter().map(String::as_str).collect();
    let mut lines = vec![
        format!("Machine: {machine}"),
        format!("Blank symbol: '{}'", descriptor.blank()),
        format!("Final states: [{}]", finals.join(", ")),
    ];
    if let Some(example) = descriptor.input_examples.first() {
        lines.push(format!("Example input: {example}"));
    }
    lines
}

/// Lines describing one snapshot. Heads past the written tape read the blank symbol.
pub(crate) fn snapshot_lines(snapshot: &Snapshot, blank: &str) -> Vec<String> {
    let mut lines = Vec::with_capacity(1 + snapshot.tapes.len() * 2);
    if snapshot.step_count == 0 {
        lines.push("=== Initialized ===".to_string());
    } else {
        lines.push(format!("Step {}:", snapshot.step_count));
    }
    lines.push(format!("State: {}", snapshot.state));
    for (i, tape) in snapshot.tapes.iter().enumerate() {
        let head = snapshot.heads.get(i).copied().unwrap_or_default();
        let symbol = snapshot
            .symbol_under_head(i)
            .map(symbol_label)
            .unwrap_or_else(|| blank.to_string());
        let cells: Vec<String> = tape.iter().map(symbol_label).collect();
        let label = if snapshot.tapes.len() == 1 {
            String::new()
        } else {
            format!(" {}", i + 1)
        };
        lines.push(format!("Tape{label}: [{}]", cells.join(", ")));
        lines.push(format!("Head{label}: {head} → '{symbol}'"));
    }
    lines
}

pub(crate) fn build_text_summary(trace: &RunTrace) -> TextSummary {
    let rule = "=".repeat(50);
    let mut lines = vec![
        rule.clone(),
        format!("Simulation completed in {} steps", trace.steps),
    ];
    if let Some(last) = trace.final_snapshot.as_ref() {
        lines.push(format!("Final state: {}", last.state));
    }
    lines.push(
        match trace.status {
            RunStatus::Accepted => "STRING ACCEPTED",
            RunStatus::Rejected => "STRING REJECTED",
            RunStatus::Running => "STOPPED BEFORE HALT",
            RunStatus::NotInitialized => "NOT INITIALIZED",
        }
        .to_string(),
    );
    lines.push(rule);
    TextSummary { lines }
}
