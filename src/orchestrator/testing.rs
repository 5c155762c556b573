//! In-memory engine used by controller and session tests.

use crate::engine::{Engine, EngineSnapshot, StepRequest};
use crate::error::EngineError;
use crate::model::MachineDescriptor;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum StepScript {
    Ok(EngineSnapshot),
    Fail(String),
}

#[derive(Default)]
pub struct Calls {
    init: AtomicUsize,
    step: AtomicUsize,
    other: AtomicUsize,
}

impl Calls {
    pub fn steps(&self) -> usize {
        self.step.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.init.load(Ordering::SeqCst) + self.steps() + self.other.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    init: Result<EngineSnapshot, String>,
    descriptor: MachineDescriptor,
    steps: Mutex<VecDeque<StepScript>>,
    step_delay: Option<Duration>,
    calls: Arc<Calls>,
}

/// Step reply for the single-tape "101" run with the head at `head`.
pub fn incrementer_step(state: &str, head: i64, halt: bool) -> EngineSnapshot {
    EngineSnapshot {
        state: state.into(),
        tapes: vec![vec!["1".into(), "0".into(), "1".into()]],
        heads: vec![head],
        halt,
        step_count: None,
    }
}

impl ScriptedEngine {
    pub fn binary_incrementer() -> Self {
        let descriptor = serde_json::from_value(serde_json::json!({
            "name": "binary-incrementer",
            "final_states": ["qf"],
            "transitions": [
                [["q0", "1"], ["q0", "1", "R"]],
                17
            ],
            "input_spec": [{"example": "101"}]
        }))
        .expect("descriptor");
        Self {
            init: Ok(incrementer_step("q0", 0, false)),
            descriptor,
            steps: Mutex::new(VecDeque::new()),
            step_delay: None,
            calls: Arc::new(Calls::default()),
        }
    }

    pub fn failing_init(mut self, msg: &str) -> Self {
        self.init = Err(msg.into());
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn push_step(&self, step: StepScript) {
        self.steps.lock().expect("steps lock").push_back(step);
    }

    pub fn calls(&self) -> Arc<Calls> {
        self.calls.clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn list_machines(&self) -> Result<Vec<String>, EngineError> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["binary-incrementer".into(), "Palindrome Checker".into()])
    }

    async fn machine_descriptor(&self, _machine: &str) -> Result<MachineDescriptor, EngineError> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        Ok(self.descriptor.clone())
    }

    async fn init_run(&self, _machine: &str, _input: &str) -> Result<EngineSnapshot, EngineError> {
        self.calls.init.fetch_add(1, Ordering::SeqCst);
        self.init.clone().map_err(|message| EngineError::Rejected {
            status: 404,
            message,
        })
    }

    async fn step_run(&self, _request: StepRequest<'_>) -> Result<EngineSnapshot, EngineError> {
        self.calls.step.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.steps.lock().expect("steps lock").pop_front();
        match next {
            Some(StepScript::Ok(s)) => Ok(s),
            Some(StepScript::Fail(message)) => Err(EngineError::Rejected {
                status: 500,
                message,
            }),
            None => Err(EngineError::Rejected {
                status: 400,
                message: "no scripted step".into(),
            }),
        }
    }
}
