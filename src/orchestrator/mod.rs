//! Run orchestration.
//!
//! This module owns the run controller, its undo history, the auto-play scheduler and the
//! session driver that ties them to the engine. UI/CLI layers only exchange commands and
//! events with the driver.

mod controller;
mod history;
mod scheduler;
mod session;
#[cfg(test)]
mod testing;
mod transitions;

pub(crate) use controller::RunController;
pub(crate) use session::{run_session, UiCommand};
pub(crate) use transitions::TransitionRow;
