//! Client side of the transition-evaluation engine.
//!
//! The engine is stateless: every step request carries the full snapshot, and the response is
//! the next snapshot. Nothing about the machine itself is modelled here.

mod http;

pub use http::HttpEngine;

use crate::error::EngineError;
use crate::model::{MachineDescriptor, Snapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot as returned by the engine. `step_count` is optional on the wire.
///
/// Tape cells stay raw JSON: strings, numbers and nulls are all valid symbols to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: String,
    pub tapes: Vec<Vec<Value>>,
    pub heads: Vec<i64>,
    #[serde(default, alias = "halted")]
    pub halt: bool,
    #[serde(default)]
    pub step_count: Option<u64>,
}

impl EngineSnapshot {
    /// Convert into a [`Snapshot`], enforcing one head per tape.
    pub fn into_snapshot(self, step_count: u64) -> Result<Snapshot, EngineError> {
        if self.tapes.len() != self.heads.len() {
            return Err(EngineError::Malformed(format!(
                "{} tapes but {} heads",
                self.tapes.len(),
                self.heads.len()
            )));
        }
        Ok(Snapshot {
            state: self.state,
            tapes: self.tapes,
            heads: self.heads,
            halted: self.halt,
            step_count,
        })
    }
}

/// Body of a step request.
#[derive(Debug, Clone, Serialize)]
pub struct StepRequest<'a> {
    pub machine: &'a str,
    pub state: &'a str,
    pub tapes: &'a [Vec<Value>],
    pub heads: &'a [i64],
    pub halt: bool,
}

impl<'a> StepRequest<'a> {
    pub fn new(machine: &'a str, snapshot: &'a Snapshot) -> Self {
        Self {
            machine,
            state: &snapshot.state,
            tapes: &snapshot.tapes,
            heads: &snapshot.heads,
            halt: snapshot.halted,
        }
    }
}

/// The engine collaborator. Implementations must be cheap to share across tasks.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    async fn list_machines(&self) -> Result<Vec<String>, EngineError>;
    async fn machine_descriptor(&self, machine: &str) -> Result<MachineDescriptor, EngineError>;
    async fn init_run(&self, machine: &str, input: &str) -> Result<EngineSnapshot, EngineError>;
    async fn step_run(&self, request: StepRequest<'_>) -> Result<EngineSnapshot, EngineError>;
}
