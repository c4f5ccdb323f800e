use crate::result::ErrorInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a batch update: which row, and what to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdateItem<U> {
    pub id: Value,
    pub data: U,
}

impl<U> BatchUpdateItem<U> {
    pub fn new(id: impl Into<Value>, data: U) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// What a batch update does after an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchUpdateMode {
    /// Abort the remaining items; they are reported as not attempted.
    #[default]
    StopOnFirstError,
    /// Keep going and report every failure.
    ContinueOnError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: ErrorInfo,
}

/// Per-item result of a non-atomic batch update.
///
/// Updates that succeeded before a failure are not rolled back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<(usize, T)>,
    pub failed: Vec<BatchFailure>,
    pub not_attempted: Vec<usize>,
}

impl<T> BatchOutcome<T> {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
        }
    }

    /// Every item was applied.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    /// Some, but not all, items were applied.
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.is_complete()
    }

    pub fn first_failure(&self) -> Option<&BatchFailure> {
        self.failed.first()
    }

    pub fn into_values(self) -> Vec<T> {
        self.succeeded.into_iter().map(|(_, value)| value).collect()
    }
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self::new()
    }
}
