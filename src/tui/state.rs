use crate::model::{MachineDescriptor, RunStatus, SessionEvent, Snapshot};
use crate::orchestrator::{TransitionRow, UiCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::Color;

pub const TAB_RUN: usize = 0;
pub const TAB_TRANSITIONS: usize = 1;
pub const TAB_HELP: usize = 2;
pub const TAB_COUNT: usize = 3;

/// Interval change per `+`/`-` press.
const INTERVAL_STEP_MS: u64 = 50;
const MIN_INTERVAL_MS: u64 = 10;

pub const ACCEPTED_NOTICE: &str = "Accepted! Machine halted in final state.";
pub const REJECTED_NOTICE: &str = "Rejected! Machine halted in non-final state.";

#[derive(Default)]
pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub info_is_error: bool,

    pub machines: Vec<String>,
    pub selected: usize,
    pub machine: Option<String>,
    pub descriptor: Option<MachineDescriptor>,

    pub input: String,
    pub editing_input: bool,

    pub snapshot: Option<Snapshot>,
    pub status: Option<RunStatus>,
    pub history_len: usize,
    pub cursor: Option<usize>,

    pub playing: bool,
    pub interval_ms: u64,

    pub transitions: Vec<TransitionRow>,
    pub show_transitions: bool,
}

/// What the UI thread should do after a key press.
#[derive(Debug)]
pub enum KeyAction {
    None,
    Send(UiCommand),
    Quit,
}

impl UiState {
    pub fn status(&self) -> RunStatus {
        self.status.unwrap_or(RunStatus::NotInitialized)
    }

    pub fn status_color(&self) -> Color {
        match self.status() {
            RunStatus::NotInitialized => Color::Gray,
            RunStatus::Running => Color::Cyan,
            RunStatus::Accepted => Color::Green,
            RunStatus::Rejected => Color::Red,
        }
    }

    pub fn blank(&self) -> &str {
        self.descriptor
            .as_ref()
            .map(MachineDescriptor::blank)
            .unwrap_or("_")
    }

    /// First input example, shown while the input field is empty.
    pub fn placeholder(&self) -> Option<&str> {
        self.descriptor
            .as_ref()
            .and_then(|d| d.input_examples.first())
            .map(String::as_str)
    }

    fn set_info(&mut self, msg: impl Into<String>, is_error: bool) {
        self.info = msg.into();
        self.info_is_error = is_error;
    }

    pub fn apply_event(&mut self, ev: SessionEvent) {
        match ev {
            SessionEvent::Machines(machines) => {
                self.machines = machines;
                self.selected = 0;
            }
            SessionEvent::Descriptor {
                machine,
                descriptor,
            } => {
                if let Some(i) = self.machines.iter().position(|m| *m == machine) {
                    self.selected = i;
                }
                self.machine = Some(machine);
                self.descriptor = Some(*descriptor);
                self.input.clear();
            }
            SessionEvent::Snapshot {
                snapshot,
                status,
                history_len,
                cursor,
            } => {
                self.snapshot = Some(snapshot);
                self.status = Some(status);
                self.history_len = history_len;
                self.cursor = cursor;
            }
            SessionEvent::Cleared => {
                self.snapshot = None;
                self.status = None;
                self.history_len = 0;
                self.cursor = None;
            }
            SessionEvent::Playing {
                playing,
                interval_ms,
            } => {
                self.playing = playing;
                self.interval_ms = interval_ms;
            }
            SessionEvent::Transitions(rows) => self.transitions = rows,
            SessionEvent::Halted { status } => {
                let notice = match status {
                    RunStatus::Accepted => ACCEPTED_NOTICE,
                    _ => REJECTED_NOTICE,
                };
                self.set_info(notice, false);
            }
            SessionEvent::Trace(_) => {}
            SessionEvent::Info(info) => self.set_info(info.to_message(), info.is_error()),
        }
    }

    /// Map a key press to local state changes and at most one session command.
    pub fn handle_key(&mut self, k: KeyEvent) -> KeyAction {
        if self.editing_input {
            return self.handle_input_key(k);
        }
        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                KeyAction::Quit
            }
            (_, KeyCode::Char('m')) => self.cycle_machine(true),
            (_, KeyCode::Char('M')) => self.cycle_machine(false),
            (_, KeyCode::Char('i')) => {
                self.tab = TAB_RUN;
                self.editing_input = true;
                self.set_info("Editing input: Enter to initialize, Esc to cancel", false);
                KeyAction::None
            }
            (_, KeyCode::Enter) => self.initialize(),
            (_, KeyCode::Char('n')) | (_, KeyCode::Char(' ')) => {
                if self.playing {
                    self.set_info("Pause auto-play before stepping manually", true);
                    KeyAction::None
                } else {
                    KeyAction::Send(UiCommand::Step)
                }
            }
            (_, KeyCode::Char('p')) => KeyAction::Send(UiCommand::TogglePlay),
            (_, KeyCode::Char('+')) | (_, KeyCode::Char('=')) => {
                self.interval_ms = self.interval_ms.saturating_add(INTERVAL_STEP_MS);
                KeyAction::Send(UiCommand::SetInterval(self.interval_ms))
            }
            (_, KeyCode::Char('-')) => {
                self.interval_ms = self
                    .interval_ms
                    .saturating_sub(INTERVAL_STEP_MS)
                    .max(MIN_INTERVAL_MS);
                KeyAction::Send(UiCommand::SetInterval(self.interval_ms))
            }
            (_, KeyCode::Char('u')) => KeyAction::Send(UiCommand::Undo),
            (_, KeyCode::Char('r')) => {
                self.set_info("Reset", false);
                KeyAction::Send(UiCommand::Reset)
            }
            (_, KeyCode::Char('t')) => {
                self.show_transitions = !self.show_transitions;
                if self.show_transitions {
                    self.tab = TAB_TRANSITIONS;
                    KeyAction::Send(UiCommand::ShowTransitions)
                } else {
                    self.tab = TAB_RUN;
                    KeyAction::None
                }
            }
            (_, KeyCode::Char('e')) => KeyAction::Send(UiCommand::Export),
            (_, KeyCode::Char('?')) => {
                self.tab = TAB_HELP;
                KeyAction::None
            }
            (_, KeyCode::Tab) => {
                self.tab = (self.tab + 1) % TAB_COUNT;
                self.show_transitions = self.tab == TAB_TRANSITIONS;
                if self.show_transitions {
                    KeyAction::Send(UiCommand::ShowTransitions)
                } else {
                    KeyAction::None
                }
            }
            _ => KeyAction::None,
        }
    }

    fn handle_input_key(&mut self, k: KeyEvent) -> KeyAction {
        match (k.modifiers, k.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => KeyAction::Quit,
            (_, KeyCode::Esc) => {
                self.editing_input = false;
                self.set_info("Input edit cancelled", false);
                KeyAction::None
            }
            (_, KeyCode::Enter) => {
                self.editing_input = false;
                self.initialize()
            }
            (_, KeyCode::Backspace) => {
                self.input.pop();
                KeyAction::None
            }
            (_, KeyCode::Char(c)) => {
                self.input.push(c);
                KeyAction::None
            }
            _ => KeyAction::None,
        }
    }

    fn initialize(&mut self) -> KeyAction {
        if self.machine.is_none() {
            self.set_info("Select a machine first (m)", true);
            return KeyAction::None;
        }
        KeyAction::Send(UiCommand::Initialize {
            input: self.input.clone(),
        })
    }

    fn cycle_machine(&mut self, forward: bool) -> KeyAction {
        if self.machines.is_empty() {
            self.set_info("No machines available", true);
            return KeyAction::None;
        }
        let n = self.machines.len();
        self.selected = if forward {
            (self.selected + 1) % n
        } else {
            (self.selected + n - 1) % n
        };
        let name = self.machines[self.selected].clone();
        self.set_info(format!("Loading {name}…"), false);
        KeyAction::Send(UiCommand::SelectMachine(name))
    }
}
