use crate::engine::{Engine, HttpEngine};
use crate::model::{InfoEvent, RunConfig, RunTrace, SessionEvent};
use crate::orchestrator::{run_session, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "turing-tape",
    version,
    about = "Step through multi-tape Turing machine runs evaluated by a remote engine"
)]
pub struct Cli {
    /// Base URL of the evaluation engine
    #[arg(long, default_value = "http://localhost:5000")]
    pub base_url: String,

    /// Machine to select on startup (required with --text/--json)
    #[arg(long)]
    pub machine: Option<String>,

    /// Input string for the first tape
    #[arg(long, default_value = "")]
    pub input: String,

    /// Auto-play interval in milliseconds
    #[arg(long, default_value_t = 200)]
    pub interval_ms: u64,

    /// Timeout for each engine request
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// Stop non-interactive runs after this many steps
    #[arg(long, default_value_t = 10_000)]
    pub max_steps: u64,

    /// Print available machines and exit
    #[arg(long)]
    pub list: bool,

    /// Run to completion and print the trace as JSON (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Run to completion and print each step as text (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Export the recorded trace as JSON after a non-interactive run
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Write logs to this file (TUI mode logs to the data directory by default)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Log filter, e.g. `info` or `turing_tape_cli=debug` (RUST_LOG takes precedence)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !(self.json || self.text || self.list)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!(
            "--json and --text are mutually exclusive. Pick one output mode."
        ));
    }

    if args.list {
        return list_machines(&args).await;
    }

    if args.json || args.text {
        if args.machine.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow::anyhow!(
                "--machine is required with --text or --json. Use --list to see machines."
            ));
        }
        return run_headless(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        Err(anyhow::anyhow!(
            "built without TUI support; use --text or --json"
        ))
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        machine: args.machine.clone().filter(|m| !m.is_empty()),
        input: args.input.clone(),
        interval_ms: args.interval_ms,
        request_timeout: Duration::from(args.request_timeout),
        max_steps: args.max_steps,
        user_agent: format!("turing-tape-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

async fn list_machines(args: &Cli) -> Result<()> {
    let cfg = build_config(args);
    let engine = HttpEngine::new(&cfg).context("create engine client")?;
    let machines = engine
        .list_machines()
        .await
        .context("failed to load machines")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&machines)?);
    } else {
        for m in machines {
            println!("{m}");
        }
    }
    Ok(())
}

/// Initialize, auto-play to halt through the session driver, and report the trace.
async fn run_headless(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let engine = Arc::new(HttpEngine::new(&cfg).context("create engine client")?);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let session_cfg = cfg.clone();
    let handle =
        tokio::spawn(async move { run_session(engine, &session_cfg, evt_tx, cmd_rx).await });

    let text = !args.json;
    let mut blank = String::from("_");
    let mut initialized = false;
    let mut playing = false;
    let mut finishing = false;
    let mut trace: Option<RunTrace> = None;
    let mut failure: Option<String> = None;

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            SessionEvent::Descriptor {
                machine,
                descriptor,
            } => {
                blank = descriptor.blank().to_string();
                if text {
                    for line in crate::text_summary::describe_machine(&machine, &descriptor) {
                        let _ = out_tx.send(OutputLine::Stderr(line));
                    }
                }
                if !initialized {
                    initialized = true;
                    let _ = cmd_tx.send(UiCommand::Initialize {
                        input: cfg.input.clone(),
                    });
                }
            }
            SessionEvent::Snapshot { snapshot, .. } => {
                if text {
                    let _ = out_tx.send(OutputLine::Stdout(String::new()));
                    for line in crate::text_summary::snapshot_lines(&snapshot, &blank) {
                        let _ = out_tx.send(OutputLine::Stdout(line));
                    }
                }
                if finishing {
                    continue;
                }
                if snapshot.halted {
                    finishing = true;
                    let _ = cmd_tx.send(UiCommand::RequestTrace);
                } else if snapshot.step_count >= cfg.max_steps {
                    finishing = true;
                    let _ = out_tx.send(OutputLine::Stderr(format!(
                        "Stopping after {} steps (--max-steps)",
                        cfg.max_steps
                    )));
                    if playing {
                        let _ = cmd_tx.send(UiCommand::TogglePlay);
                    }
                    let _ = cmd_tx.send(UiCommand::RequestTrace);
                } else if !playing {
                    playing = true;
                    let _ = cmd_tx.send(UiCommand::TogglePlay);
                }
            }
            SessionEvent::Trace(t) => {
                trace = Some(*t);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            SessionEvent::Info(info) if info.is_error() => {
                let msg = info.to_message();
                let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
                failure.get_or_insert(msg);
                let _ = cmd_tx.send(UiCommand::RequestTrace);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            SessionEvent::Info(info @ InfoEvent::Initialized { .. }) if text => {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
            _ => {}
        }
    }
    drop(cmd_tx);

    handle.await.context("session task failed")??;

    if let Some(trace) = trace.as_ref() {
        if let Some(p) = args.export_json.as_deref() {
            crate::export::export_json(p, trace)?;
            let _ = out_tx.send(OutputLine::Stderr(format!("Exported: {}", p.display())));
        }
        if args.json {
            let out = serde_json::to_string_pretty(trace)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        } else {
            let _ = out_tx.send(OutputLine::Stdout(String::new()));
            for line in crate::text_summary::build_text_summary(trace).lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    match failure {
        Some(msg) => Err(anyhow::anyhow!(msg)),
        None if trace.is_none() => Err(anyhow::anyhow!("run produced no trace")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_config_maps_flags() {
        let args = Cli::parse_from([
            "turing-tape",
            "--machine",
            "binary-incrementer",
            "--input",
            "101",
            "--interval-ms",
            "50",
            "--request-timeout",
            "2s",
            "--text",
        ]);
        assert!(!args.is_interactive());
        let cfg = build_config(&args);
        assert_eq!(cfg.machine.as_deref(), Some("binary-incrementer"));
        assert_eq!(cfg.input, "101");
        assert_eq!(cfg.interval_ms, 50);
        assert_eq!(cfg.request_timeout, Duration::from_secs(2));
        assert_eq!(cfg.base_url, "http://localhost:5000");
    }

    #[test]
    fn empty_machine_flag_is_treated_as_absent() {
        let args = Cli::parse_from(["turing-tape", "--machine", ""]);
        assert!(args.is_interactive());
        assert_eq!(build_config(&args).machine, None);
    }

    #[tokio::test]
    async fn headless_modes_require_a_machine() {
        let args = Cli::parse_from(["turing-tape", "--json"]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("--machine is required"));

        let args = Cli::parse_from(["turing-tape", "--json", "--text", "--machine", "m"]);
        assert!(run(args).await.is_err());
    }
}
