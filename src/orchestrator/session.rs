//! Session driver.
//!
//! Owns one [`RunController`] and its [`StepScheduler`] and multiplexes operator commands,
//! auto-play deadlines and the single in-flight engine call. Presentation layers talk to it
//! only through channels.

use super::controller::{PendingStep, RunController};
use super::scheduler::{StepScheduler, Tick};
use crate::engine::{Engine, EngineSnapshot};
use crate::error::{ControllerError, EngineError};
use crate::model::{InfoEvent, RunConfig, SessionEvent};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info};

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    SelectMachine(String),
    Initialize { input: String },
    Step,
    TogglePlay,
    SetInterval(u64),
    Undo,
    Reset,
    ShowTransitions,
    /// Write the current trace to a JSON file in the working directory.
    Export,
    /// Emit the current trace as a [`SessionEvent::Trace`].
    RequestTrace,
    Quit,
}

type StepFuture = BoxFuture<'static, (PendingStep, Result<EngineSnapshot, EngineError>)>;

/// The engine call currently awaited, and whether auto-play asked for it.
struct InFlight {
    fut: StepFuture,
    scheduled: bool,
}

struct Session<E: Engine> {
    controller: RunController<E>,
    scheduler: StepScheduler,
    event_tx: UnboundedSender<SessionEvent>,
    base_url: String,
    last_input: String,
}

impl<E: Engine> Session<E> {
    fn emit(&self, ev: SessionEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn info(&self, msg: impl Into<String>) {
        self.emit(SessionEvent::Info(InfoEvent::Message(msg.into())));
    }

    fn error(&self, err: &ControllerError) {
        self.emit(SessionEvent::Info(InfoEvent::Error(err.to_string())));
    }

    fn emit_snapshot(&self) {
        if let Some(snapshot) = self.controller.current() {
            self.emit(SessionEvent::Snapshot {
                snapshot: snapshot.clone(),
                status: self.controller.status(),
                history_len: self.controller.history().len(),
                cursor: self.controller.history().cursor(),
            });
        }
    }

    fn emit_playing(&self) {
        self.emit(SessionEvent::Playing {
            playing: self.scheduler.is_running(),
            interval_ms: self.scheduler.interval().as_millis() as u64,
        });
    }

    fn stop_playing(&mut self) {
        if self.scheduler.is_running() {
            self.scheduler.stop();
            self.emit_playing();
        }
    }

    fn launch_step(&mut self, scheduled: bool) -> Option<InFlight> {
        match self.controller.begin_step() {
            Ok(pending) => {
                let engine = self.controller.engine();
                let fut = async move {
                    let result = pending.send(engine.as_ref()).await;
                    (pending, result)
                }
                .boxed();
                Some(InFlight { fut, scheduled })
            }
            Err(e) => {
                self.error(&e);
                if scheduled {
                    self.scheduler
                        .complete(false, self.controller.status(), Instant::now());
                    self.emit_playing();
                }
                None
            }
        }
    }

    fn land_step(
        &mut self,
        pending: PendingStep,
        result: Result<EngineSnapshot, EngineError>,
        scheduled: bool,
    ) {
        let was_running = self.scheduler.is_running();
        let now = Instant::now();
        match self.controller.finish_step(pending, result) {
            Ok(Some(snapshot)) => {
                self.emit_snapshot();
                if snapshot.halted {
                    self.emit(SessionEvent::Halted {
                        status: self.controller.status(),
                    });
                }
                if scheduled {
                    self.scheduler
                        .complete(true, self.controller.status(), now);
                }
            }
            // Stale result from before a reset; a newer cadence must not be judged by it.
            Ok(None) => {
                if scheduled {
                    self.scheduler.discard(now);
                }
            }
            Err(e) => {
                self.error(&e);
                if scheduled {
                    self.scheduler
                        .complete(false, self.controller.status(), now);
                } else {
                    // A manual step that fails while auto-play is on stops it as well.
                    self.scheduler.stop();
                }
            }
        }
        if was_running && !self.scheduler.is_running() {
            self.emit_playing();
        }
    }

    async fn select(&mut self, machine: &str) {
        self.stop_playing();
        let loaded = self
            .controller
            .select_machine(machine)
            .await
            .map(|d| Box::new(d.clone()));
        match loaded {
            Ok(descriptor) => {
                self.emit(SessionEvent::Descriptor {
                    machine: machine.to_string(),
                    descriptor,
                });
                self.emit(SessionEvent::Cleared);
                if let Ok(rows) = self.controller.transitions() {
                    self.emit(SessionEvent::Transitions(rows));
                }
            }
            Err(e) => self.error(&e),
        }
    }

    async fn initialize(&mut self, input: String) {
        self.stop_playing();
        let machine = self.controller.machine().unwrap_or_default().to_string();
        match self.controller.initialize(&machine, &input).await {
            Ok(_) => {
                self.last_input = input;
                self.emit_snapshot();
                self.emit(SessionEvent::Info(InfoEvent::Initialized { machine }));
            }
            Err(e) => self.error(&e),
        }
    }

    fn toggle_play(&mut self) {
        if self.scheduler.is_running() {
            self.stop_playing();
            return;
        }
        let interval = self.scheduler.interval();
        match self
            .scheduler
            .start(interval, self.controller.status(), Instant::now())
        {
            Ok(()) => self.emit_playing(),
            Err(e) => self.error(&e),
        }
    }

    fn trace(&self) -> Option<crate::model::RunTrace> {
        crate::export::build_trace(&self.controller, &self.base_url, &self.last_input)
    }
}

/// Run one operator session until `Quit` or until the command channel closes.
pub(crate) async fn run_session<E: Engine>(
    engine: Arc<E>,
    cfg: &RunConfig,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut session = Session {
        controller: RunController::new(engine),
        scheduler: StepScheduler::new(Duration::from_millis(cfg.interval_ms)),
        event_tx,
        base_url: cfg.base_url.clone(),
        last_input: cfg.input.clone(),
    };
    session.emit_playing();

    match session.controller.list_machines().await {
        Ok(machines) => {
            let first = cfg.machine.clone().or_else(|| machines.first().cloned());
            session.emit(SessionEvent::Machines(machines));
            if let Some(machine) = first {
                session.select(&machine).await;
            }
        }
        Err(e) => {
            session.error(&e);
            if let Some(machine) = cfg.machine.as_deref() {
                session.select(machine).await;
            }
        }
    }

    let mut in_flight: Option<InFlight> = None;

    let res = loop {
        // Auto-play ticks wait while any step, manual or scheduled, is outstanding.
        let deadline = if in_flight.is_some() {
            None
        } else {
            session.scheduler.next_deadline()
        };

        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break Ok(());
                };
                debug!(?cmd, "session command");
                match cmd {
                    UiCommand::SelectMachine(machine) => session.select(&machine).await,
                    UiCommand::Initialize { input } => session.initialize(input).await,
                    UiCommand::Step => {
                        if session.scheduler.is_running() {
                            session.error(&ControllerError::precondition(
                                "Pause auto-play before stepping manually",
                            ));
                        } else if in_flight.is_some() {
                            session.error(&ControllerError::precondition(
                                "a step is already in progress",
                            ));
                        } else {
                            in_flight = session.launch_step(false);
                        }
                    }
                    UiCommand::TogglePlay => session.toggle_play(),
                    UiCommand::SetInterval(ms) => {
                        session
                            .scheduler
                            .update_interval(Duration::from_millis(ms), Instant::now());
                        session.emit_playing();
                    }
                    UiCommand::Undo => match session.controller.undo() {
                        Ok(_) => session.emit_snapshot(),
                        Err(e) => session.error(&e),
                    },
                    UiCommand::Reset => {
                        session.stop_playing();
                        session.controller.reset();
                        session.emit(SessionEvent::Cleared);
                    }
                    UiCommand::ShowTransitions => match session.controller.transitions() {
                        Ok(rows) => session.emit(SessionEvent::Transitions(rows)),
                        Err(e) => session.error(&e),
                    },
                    UiCommand::Export => match session.trace() {
                        Some(trace) => match crate::export::export_to_cwd(&trace) {
                            Ok(path) => {
                                session.emit(SessionEvent::Info(InfoEvent::Exported { path }))
                            }
                            Err(e) => session.emit(SessionEvent::Info(InfoEvent::Error(
                                format!("Export failed: {e:#}"),
                            ))),
                        },
                        None => session.info("No run to export yet."),
                    },
                    UiCommand::RequestTrace => {
                        if let Some(trace) = session.trace() {
                            session.emit(SessionEvent::Trace(Box::new(trace)));
                        }
                    }
                    UiCommand::Quit => break Ok(()),
                }
            }
            // Poll the in-flight step through a reference so losing the race never drops it.
            done = async {
                match in_flight.as_mut() {
                    Some(f) => (&mut f.fut).await,
                    None => futures::future::pending().await,
                }
            } => {
                let scheduled = in_flight.take().map(|f| f.scheduled).unwrap_or(false);
                let (pending, result) = done;
                session.land_step(pending, result, scheduled);
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => futures::future::pending().await,
                }
            } => {
                match session.scheduler.poll(Instant::now(), session.controller.status()) {
                    Tick::Step => in_flight = session.launch_step(true),
                    Tick::Stopped => session.emit_playing(),
                    Tick::Idle | Tick::Wait => {}
                }
            }
        }
    };

    info!("session closed");
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use crate::orchestrator::testing::{incrementer_step, ScriptedEngine, StepScript};
    use tokio::sync::mpsc;

    fn config() -> RunConfig {
        RunConfig {
            base_url: "http://engine.test".into(),
            machine: Some("binary-incrementer".into()),
            input: String::new(),
            interval_ms: 200,
            request_timeout: Duration::from_secs(5),
            max_steps: 100,
            user_agent: "turing-tape-cli/test".into(),
        }
    }

    async fn run_script(
        engine: ScriptedEngine,
        script: impl FnOnce(UnboundedSender<UiCommand>) -> BoxFuture<'static, ()>,
    ) -> Vec<SessionEvent> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cfg = config();
        let engine = Arc::new(engine);
        let handle =
            tokio::spawn(async move { run_session(engine, &cfg, event_tx, cmd_rx).await });
        script(cmd_tx.clone()).await;
        let _ = cmd_tx.send(UiCommand::Quit);
        handle.await.expect("join").expect("session");

        let mut events = Vec::new();
        while let Some(ev) = event_rx.recv().await {
            events.push(ev);
        }
        events
    }

    fn snapshots(events: &[SessionEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Snapshot { snapshot, .. } => Some(snapshot.step_count),
                _ => None,
            })
            .collect()
    }

    fn errors(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Info(i) if i.is_error() => Some(i.to_message()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn auto_play_runs_until_halt_then_stops() {
        let engine = ScriptedEngine::binary_incrementer();
        engine.push_step(StepScript::Ok(incrementer_step("q0", 1, false)));
        engine.push_step(StepScript::Ok(incrementer_step("q0", 2, false)));
        engine.push_step(StepScript::Ok(incrementer_step("qf", 3, true)));

        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::TogglePlay).unwrap();
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            .boxed()
        })
        .await;

        assert_eq!(snapshots(&events), vec![0, 1, 2, 3]);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Halted { status: RunStatus::Accepted })));
        let last_playing = events.iter().rev().find_map(|e| match e {
            SessionEvent::Playing { playing, .. } => Some(*playing),
            _ => None,
        });
        assert_eq!(last_playing, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn play_without_run_is_refused() {
        let events = run_script(ScriptedEngine::binary_incrementer(), |tx| {
            async move {
                tx.send(UiCommand::TogglePlay).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            .boxed()
        })
        .await;
        assert!(errors(&events)
            .iter()
            .any(|m| m.contains("Cannot start auto-step")));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::Playing { playing: true, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_step_is_refused_while_playing() {
        let engine = ScriptedEngine::binary_incrementer();
        engine.push_step(StepScript::Ok(incrementer_step("q0", 1, false)));
        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::TogglePlay).unwrap();
                tx.send(UiCommand::Step).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            .boxed()
        })
        .await;
        assert!(errors(&events).iter().any(|m| m.contains("Pause auto-play")));
        assert_eq!(snapshots(&events), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_scheduled_step_does_not_stop_new_auto_play() {
        let engine =
            ScriptedEngine::binary_incrementer().with_step_delay(Duration::from_millis(100));
        engine.push_step(StepScript::Ok(incrementer_step("q0", 1, false)));
        engine.push_step(StepScript::Ok(incrementer_step("q0", 1, false)));
        engine.push_step(StepScript::Ok(incrementer_step("qf", 2, true)));
        let calls = engine.calls();
        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::TogglePlay).unwrap();
                // First tick fires at 200 ms and is still with the engine at 250 ms.
                tokio::time::sleep(Duration::from_millis(250)).await;
                tx.send(UiCommand::Reset).unwrap();
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::TogglePlay).unwrap();
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            .boxed()
        })
        .await;

        assert_eq!(calls.steps(), 3);
        assert_eq!(snapshots(&events), vec![0, 0, 1, 2]);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Halted { status: RunStatus::Accepted })));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_manual_step_stops_auto_play() {
        let engine =
            ScriptedEngine::binary_incrementer().with_step_delay(Duration::from_millis(100));
        engine.push_step(StepScript::Fail("boom".into()));
        let calls = engine.calls();
        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::Step).unwrap();
                tx.send(UiCommand::TogglePlay).unwrap();
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            .boxed()
        })
        .await;

        assert_eq!(calls.steps(), 1);
        assert!(errors(&events).iter().any(|m| m.contains("boom")));
        let last_playing = events.iter().rev().find_map(|e| match e {
            SessionEvent::Playing { playing, .. } => Some(*playing),
            _ => None,
        });
        assert_eq!(last_playing, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_step_in_flight() {
        let engine = ScriptedEngine::binary_incrementer().with_step_delay(Duration::from_millis(100));
        engine.push_step(StepScript::Ok(incrementer_step("q1", 1, false)));
        let calls = engine.calls();
        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::Step).unwrap();
                tx.send(UiCommand::Reset).unwrap();
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            .boxed()
        })
        .await;

        assert_eq!(calls.steps(), 1);
        let cleared_at = events
            .iter()
            .rposition(|e| matches!(e, SessionEvent::Cleared))
            .expect("cleared");
        assert!(!events[cleared_at..]
            .iter()
            .any(|e| matches!(e, SessionEvent::Snapshot { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn undo_and_transitions_round_trip_through_session() {
        let engine = ScriptedEngine::binary_incrementer();
        engine.push_step(StepScript::Ok(incrementer_step("q0", 1, false)));
        let events = run_script(engine, |tx| {
            async move {
                tx.send(UiCommand::Initialize { input: "101".into() }).unwrap();
                tx.send(UiCommand::Step).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(UiCommand::Undo).unwrap();
                tx.send(UiCommand::Undo).unwrap();
                tx.send(UiCommand::ShowTransitions).unwrap();
                tx.send(UiCommand::RequestTrace).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            .boxed()
        })
        .await;

        assert_eq!(snapshots(&events), vec![0, 1, 0]);
        assert!(errors(&events)
            .iter()
            .any(|m| m.contains("no earlier step")));
        let trace = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Trace(t) => Some(t.clone()),
                _ => None,
            })
            .expect("trace");
        assert_eq!(trace.history.len(), 2);
        assert_eq!(trace.steps, 0);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Transitions(rows) if rows.len() == 2)));
    }
}
