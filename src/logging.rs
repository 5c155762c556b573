use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_TEXT_FILTER: &str = "warn";
const DEFAULT_TUI_FILTER: &str = "info";

/// Default log location for TUI mode, where stderr belongs to the terminal UI.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("turing-tape-cli").join("turing-tape.log"))
}

fn filter(level: Option<&str>, fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or(fallback)))
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber. RUST_LOG overrides `level`.
///
/// Interactive sessions log to a file (explicit or default); other modes log to stderr
/// unless a file is given.
pub fn init(interactive: bool, level: Option<&str>, file: Option<&Path>) -> Result<()> {
    let fallback = if interactive {
        DEFAULT_TUI_FILTER
    } else {
        DEFAULT_TEXT_FILTER
    };
    let target = match file {
        Some(p) => Some(p.to_path_buf()),
        None if interactive => default_log_path(),
        None => None,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level, fallback))
        .with_target(false);

    let res = match target {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(f))
                .try_init()
        }
        // Interactive without a data dir: drop logs rather than draw over the UI.
        None if interactive => builder.with_writer(std::io::sink).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    res.map_err(|e| anyhow::anyhow!("install log subscriber: {e}"))
}
