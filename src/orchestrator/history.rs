//! Undo history of observed snapshots.

use crate::error::ControllerError;
use crate::model::Snapshot;

/// Snapshots in step order plus a cursor at the one currently shown.
///
/// Recording after an undo drops everything past the cursor, so there is no redo.
#[derive(Debug, Clone, Default)]
pub struct HistoryStack {
    entries: Vec<Snapshot>,
    cursor: Option<usize>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: &Snapshot) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(snapshot.clone());
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Move the cursor back one entry and return a copy of it.
    pub fn undo(&mut self) -> Result<Snapshot, ControllerError> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                Ok(self.entries[c - 1].clone())
            }
            _ => Err(ControllerError::NoHistory),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    /// Entry under the cursor.
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor?)
    }
}
