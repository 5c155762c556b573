use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub input: String,
    pub interval_ms: u64,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_steps: u64,
    pub user_agent: String,
}

/// State of one run at one point in time.
///
/// Snapshots are plain owned values; recording one into history clones it, so the live
/// snapshot and recorded entries never share storage. Tape cells are kept exactly as the
/// engine sent them and go back to it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: String,
    pub tapes: Vec<Vec<Value>>,
    pub heads: Vec<i64>,
    pub halted: bool,
    pub step_count: u64,
}

impl Snapshot {
    /// Symbol under the head of `tape`, or `None` when the head is off the written tape.
    pub fn symbol_under_head(&self, tape: usize) -> Option<&Value> {
        let head = *self.heads.get(tape)?;
        let idx = usize::try_from(head).ok()?;
        self.tapes.get(tape)?.get(idx)
    }
}

/// Display form of a tape or transition token. `null` renders as the empty string.
pub fn symbol_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Derived run status shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    NotInitialized,
    Running,
    Accepted,
    Rejected,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::NotInitialized => "Not initialized",
            RunStatus::Running => "Running",
            RunStatus::Accepted => "Accepted!",
            RunStatus::Rejected => "Rejected",
        }
    }
}

/// Machine description published by the engine. Read-only on this side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "final_state", deserialize_with = "one_or_many_states")]
    pub final_states: BTreeSet<String>,
    #[serde(default, alias = "transition")]
    pub transitions: Vec<serde_json::Value>,
    #[serde(default, alias = "input_spec", deserialize_with = "input_examples")]
    pub input_examples: Vec<String>,
    #[serde(default)]
    pub blank_symbol: Option<String>,
    #[serde(default)]
    pub tapes: Option<u32>,
    #[serde(default)]
    pub initial_state: Option<String>,
}

impl MachineDescriptor {
    pub fn is_final(&self, state: &str) -> bool {
        self.final_states.contains(state)
    }

    pub fn blank(&self) -> &str {
        self.blank_symbol.as_deref().unwrap_or("_")
    }
}

fn one_or_many_states<'de, D>(de: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) => BTreeSet::from([s]),
        OneOrMany::Many(v) => v.into_iter().collect(),
        OneOrMany::Null(()) => BTreeSet::new(),
    })
}

/// Accepts either a plain list of strings or `[{ "example": "..." }, ...]`.
fn input_examples<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Example {
        Plain(String),
        Spec { example: serde_json::Value },
    }

    let items = Option::<Vec<Example>>::deserialize(de)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .map(|e| match e {
            Example::Plain(s) => s,
            Example::Spec {
                example: serde_json::Value::String(s),
            } => s,
            Example::Spec { example } => example.to_string(),
        })
        .collect())
}

/// Full record of a finished (or abandoned) run, used by JSON output and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub timestamp_utc: String,
    pub base_url: String,
    pub machine: String,
    pub input: String,
    pub status: RunStatus,
    pub steps: u64,
    #[serde(rename = "final")]
    pub final_snapshot: Option<Snapshot>,
    pub history: Vec<Snapshot>,
}

/// Events emitted by the session driver for presentation layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Machines(Vec<String>),
    Descriptor {
        machine: String,
        descriptor: Box<MachineDescriptor>,
    },
    Snapshot {
        snapshot: Snapshot,
        status: RunStatus,
        history_len: usize,
        cursor: Option<usize>,
    },
    Cleared,
    Playing {
        playing: bool,
        interval_ms: u64,
    },
    Transitions(Vec<crate::orchestrator::TransitionRow>),
    Halted {
        status: RunStatus,
    },
    Trace(Box<RunTrace>),
    Info(InfoEvent),
}

/// Structured info events emitted by the driver and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    Error(String),
    Initialized { machine: String },
    Exported { path: std::path::PathBuf },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Error(msg) => format!("Error: {msg}"),
            InfoEvent::Initialized { machine } => format!("Simulation initialized ({machine})"),
            InfoEvent::Exported { path } => format!("Exported JSON: {}", path.display()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InfoEvent::Error(_))
    }
}
