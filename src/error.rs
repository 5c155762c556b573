use thiserror::Error;

/// Failures talking to the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("engine rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed engine response: {0}")]
    Malformed(String),
}

/// Failures surfaced by the run controller and scheduler.
///
/// Validation, precondition and history failures are detected locally and never change any
/// state. Engine failures abort only the operation that was in flight.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Precondition(String),
    #[error("no earlier step to return to")]
    NoHistory,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ControllerError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Precondition-class failures, including an exhausted history.
    #[cfg(test)]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::NoHistory)
    }
}

/// One transition-table row that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transition #{index}: {reason}")]
pub struct RenderError {
    pub index: usize,
    pub reason: String,
}
