//! Run controller.
//!
//! Owns the live snapshot of one run, advances it through the engine, and keeps the undo
//! history in step with it.

use super::history::HistoryStack;
use super::transitions::{normalize_table, TransitionRow};
use crate::engine::{Engine, EngineSnapshot, StepRequest};
use crate::error::{ControllerError, EngineError};
use crate::model::{MachineDescriptor, RunStatus, Snapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A step that has been validated and handed out for the engine round-trip.
///
/// Produced by [`RunController::begin_step`] and consumed by [`RunController::finish_step`].
#[derive(Debug, Clone)]
pub struct PendingStep {
    generation: u64,
    machine: String,
    snapshot: Snapshot,
}

impl PendingStep {
    pub async fn send<E: Engine + ?Sized>(&self, engine: &E) -> Result<EngineSnapshot, EngineError> {
        engine
            .step_run(StepRequest::new(&self.machine, &self.snapshot))
            .await
    }
}

pub struct RunController<E: Engine> {
    engine: Arc<E>,
    machine: Option<String>,
    descriptor: Option<MachineDescriptor>,
    // The live snapshot is the history entry under the cursor.
    history: HistoryStack,
    // Bumped on every initialize/reset so late engine replies can be recognised and dropped.
    generation: u64,
    step_in_flight: bool,
}

impl<E: Engine> RunController<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            machine: None,
            descriptor: None,
            history: HistoryStack::new(),
            generation: 0,
            step_in_flight: false,
        }
    }

    pub fn engine(&self) -> Arc<E> {
        self.engine.clone()
    }

    pub fn machine(&self) -> Option<&str> {
        self.machine.as_deref()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.history.current()
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    #[cfg(test)]
    pub fn step_in_flight(&self) -> bool {
        self.step_in_flight
    }

    pub async fn list_machines(&self) -> Result<Vec<String>, ControllerError> {
        Ok(self.engine.list_machines().await?)
    }

    /// Make `machine` the active machine. The previous run is discarded on success.
    pub async fn select_machine(
        &mut self,
        machine: &str,
    ) -> Result<&MachineDescriptor, ControllerError> {
        if machine.is_empty() {
            return Err(ControllerError::Validation("Please select a machine".into()));
        }
        let descriptor = self.engine.machine_descriptor(machine).await.map_err(|e| {
            warn!(machine, error = %e, "failed to load machine descriptor");
            e
        })?;
        self.reset();
        info!(
            machine,
            transitions = descriptor.transitions.len(),
            "machine selected"
        );
        self.machine = Some(machine.to_string());
        Ok(self.descriptor.insert(descriptor))
    }

    pub async fn initialize(
        &mut self,
        machine: &str,
        input: &str,
    ) -> Result<Snapshot, ControllerError> {
        if machine.is_empty() {
            return Err(ControllerError::Validation("Please select a machine".into()));
        }

        let init = self.engine.init_run(machine, input).await.map_err(|e| {
            warn!(machine, error = %e, "initialization failed");
            e
        })?;
        let snapshot = init.into_snapshot(0)?;

        let descriptor = if self.machine.as_deref() == Some(machine) && self.descriptor.is_some() {
            None
        } else {
            Some(self.engine.machine_descriptor(machine).await?)
        };

        self.reset();
        if let Some(d) = descriptor {
            self.descriptor = Some(d);
        }
        self.machine = Some(machine.to_string());
        self.history.record(&snapshot);
        info!(
            machine,
            input,
            state = %snapshot.state,
            tapes = snapshot.tapes.len(),
            "simulation initialized"
        );
        Ok(snapshot)
    }

    /// Validate that a step may be taken and hand out what the engine needs.
    pub fn begin_step(&mut self) -> Result<PendingStep, ControllerError> {
        let snapshot = match self.history.current() {
            Some(s) if !s.halted => s.clone(),
            _ => {
                return Err(ControllerError::precondition(
                    "Simulation not initialized or already halted",
                ))
            }
        };
        if self.step_in_flight {
            return Err(ControllerError::precondition("a step is already in progress"));
        }
        let machine = self.machine.clone().unwrap_or_default();
        self.step_in_flight = true;
        Ok(PendingStep {
            generation: self.generation,
            machine,
            snapshot,
        })
    }

    /// Apply the engine's answer to `pending`.
    ///
    /// Returns `Ok(None)` when the session was reset or re-initialized while the step was in
    /// flight; the answer is dropped and nothing changes.
    pub fn finish_step(
        &mut self,
        pending: PendingStep,
        result: Result<EngineSnapshot, EngineError>,
    ) -> Result<Option<Snapshot>, ControllerError> {
        if pending.generation != self.generation {
            debug!(
                stale = pending.generation,
                current = self.generation,
                "discarding step result from a previous session"
            );
            return Ok(None);
        }
        self.step_in_flight = false;

        let response = result.map_err(|e| {
            warn!(error = %e, step = pending.snapshot.step_count + 1, "step failed");
            e
        })?;
        let previous = pending.snapshot.step_count;
        // A reported count of 0 is treated as absent.
        let step_count = match response.step_count {
            Some(n) if n > 0 => n,
            _ => previous + 1,
        };
        let snapshot = response.into_snapshot(step_count)?;

        self.history.record(&snapshot);
        debug!(step = step_count, state = %snapshot.state, "step applied");

        if snapshot.halted {
            info!(
                step = step_count,
                state = %snapshot.state,
                accepted = self.status() == RunStatus::Accepted,
                "machine halted"
            );
        }
        Ok(Some(snapshot))
    }

    pub async fn step(&mut self) -> Result<Snapshot, ControllerError> {
        let pending = self.begin_step()?;
        let result = pending.send(self.engine.as_ref()).await;
        self.finish_step(pending, result)?
            .ok_or_else(|| ControllerError::precondition("session was reset during the step"))
    }

    /// Go back one recorded step without contacting the engine.
    pub fn undo(&mut self) -> Result<Snapshot, ControllerError> {
        if self.step_in_flight {
            return Err(ControllerError::precondition("a step is in progress"));
        }
        let snapshot = self.history.undo()?;
        info!(step = snapshot.step_count, state = %snapshot.state, "undo");
        Ok(snapshot)
    }

    pub fn reset(&mut self) {
        if !self.history.is_empty() {
            debug!(machine = ?self.machine, "session reset");
        }
        self.history.clear();
        self.generation += 1;
        self.step_in_flight = false;
    }

    pub fn status(&self) -> RunStatus {
        match self.history.current() {
            None => RunStatus::NotInitialized,
            Some(s) if !s.halted => RunStatus::Running,
            Some(s) => {
                if self.descriptor.as_ref().is_some_and(|d| d.is_final(&s.state)) {
                    RunStatus::Accepted
                } else {
                    RunStatus::Rejected
                }
            }
        }
    }

    /// Normalized transition table of the active machine, one row per entry.
    pub fn transitions(&self) -> Result<Vec<TransitionRow>, ControllerError> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or_else(|| ControllerError::precondition("no machine selected"))?;
        Ok(normalize_table(&descriptor.transitions))
    }
}
