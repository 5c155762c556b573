//! Run trace construction and JSON export.

use crate::engine::Engine;
use crate::model::RunTrace;
use crate::orchestrator::RunController;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Build a trace of the controller's current run. `None` before the first initialize.
pub(crate) fn build_trace<E: Engine>(
    controller: &RunController<E>,
    base_url: &str,
    input: &str,
) -> Option<RunTrace> {
    let current = controller.current()?;
    Some(RunTrace {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        base_url: base_url.to_string(),
        machine: controller.machine().unwrap_or_default().to_string(),
        input: input.to_string(),
        status: controller.status(),
        steps: current.step_count,
        final_snapshot: Some(current.clone()),
        history: controller.history().entries().to_vec(),
    })
}

pub(crate) fn export_json(path: &Path, trace: &RunTrace) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let out = serde_json::to_string_pretty(trace)?;
    std::fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// File name derived from the trace's machine and timestamp.
pub(crate) fn default_file_name(trace: &RunTrace) -> String {
    let machine: String = trace
        .machine
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!(
        "turing-{}-{}.json",
        machine,
        trace.timestamp_utc.replace(':', "-").replace('T', "_")
    )
}

/// Export into the current working directory and return the absolute path.
pub(crate) fn export_to_cwd(trace: &RunTrace) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(default_file_name(trace));
    export_json(&path, trace)?;
    Ok(path)
}
