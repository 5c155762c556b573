//! Auto-play cadence.
//!
//! [`StepScheduler`] is a plain state machine: callers feed it the current time and run
//! status and it answers whether a step is due. It never steps by itself, which keeps at most
//! one step in flight and lets tests drive it with virtual instants.

use crate::error::ControllerError;
use crate::model::RunStatus;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { interval: Duration },
}

/// What the driver should do after polling the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing scheduled.
    Idle,
    /// Not due yet, or waiting for the in-flight step.
    Wait,
    /// Perform one step, then report back through [`StepScheduler::complete`].
    Step,
    /// The run stopped being active; the scheduler went idle.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct StepScheduler {
    state: SchedulerState,
    preferred: Duration,
    next_due: Option<Instant>,
    in_flight: bool,
}

impl StepScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            preferred: interval.max(MIN_INTERVAL),
            next_due: None,
            in_flight: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SchedulerState::Running { .. })
    }

    /// Interval used by the running cadence, or the one the next `start` will use.
    pub fn interval(&self) -> Duration {
        match self.state {
            SchedulerState::Running { interval } => interval,
            SchedulerState::Idle => self.preferred,
        }
    }

    /// Instant of the next tick; `None` when idle or while a step is in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.in_flight {
            None
        } else {
            self.next_due
        }
    }

    pub fn start(
        &mut self,
        interval: Duration,
        status: RunStatus,
        now: Instant,
    ) -> Result<(), ControllerError> {
        if self.is_running() {
            return Err(ControllerError::precondition("auto-play is already running"));
        }
        if status != RunStatus::Running {
            return Err(ControllerError::precondition(
                "Cannot start auto-step without a running simulation",
            ));
        }
        let interval = interval.max(MIN_INTERVAL);
        self.preferred = interval;
        self.state = SchedulerState::Running { interval };
        self.next_due = Some(now + interval);
        debug!(interval_ms = interval.as_millis() as u64, "auto-play started");
        Ok(())
    }

    /// Replace the interval. When running the cadence restarts from `now`.
    pub fn update_interval(&mut self, interval: Duration, now: Instant) {
        let interval = interval.max(MIN_INTERVAL);
        self.preferred = interval;
        if let SchedulerState::Running { .. } = self.state {
            self.state = SchedulerState::Running { interval };
            if !self.in_flight {
                self.next_due = Some(now + interval);
            }
            debug!(interval_ms = interval.as_millis() as u64, "auto-play interval changed");
        }
    }

    pub fn stop(&mut self) {
        if self.is_running() {
            debug!("auto-play stopped");
        }
        self.state = SchedulerState::Idle;
        self.next_due = None;
    }

    pub fn poll(&mut self, now: Instant, status: RunStatus) -> Tick {
        let SchedulerState::Running { .. } = self.state else {
            return Tick::Idle;
        };
        if self.in_flight {
            return Tick::Wait;
        }
        match self.next_due {
            Some(due) if due <= now => {}
            _ => return Tick::Wait,
        }
        if status != RunStatus::Running {
            self.stop();
            return Tick::Stopped;
        }
        self.in_flight = true;
        self.next_due = None;
        Tick::Step
    }

    /// Report the outcome of a step requested by [`Tick::Step`].
    ///
    /// Returns `true` when the scheduler is still running afterwards.
    pub fn complete(&mut self, succeeded: bool, status: RunStatus, now: Instant) -> bool {
        self.in_flight = false;
        let SchedulerState::Running { interval } = self.state else {
            return false;
        };
        if !succeeded || status != RunStatus::Running {
            self.stop();
            return false;
        }
        self.next_due = Some(now + interval);
        true
    }

    /// The requested step was dropped as stale: release the tick without judging the run.
    ///
    /// A cadence started after that step was requested keeps its own deadline.
    pub fn discard(&mut self, now: Instant) {
        self.in_flight = false;
        if let SchedulerState::Running { interval } = self.state {
            if self.next_due.is_none() {
                self.next_due = Some(now + interval);
            }
        }
    }
}
