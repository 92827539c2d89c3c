//! Per-item results of a batch run.

use ballast_core::CancelReason;
use std::collections::HashMap;
use std::fmt;

/// Why a single item did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFailure {
    /// The worker returned an error (or panicked).
    Failed { message: String },
    /// The batch context fired before the worker was called.
    Cancelled { reason: CancelReason },
}

impl ItemFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        ItemFailure::Failed {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemFailure::Cancelled { .. })
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailure::Failed { message } => f.write_str(message),
            ItemFailure::Cancelled { reason } => write!(f, "cancelled: {}", reason),
        }
    }
}

/// Every failed item of a batch, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} item(s) failed: {}", .failures.len(), render(.failures))]
pub struct BatchError {
    pub failures: Vec<(String, String)>,
}

fn render(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, message)| format!("{}: {}", id, message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BatchError {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(id, _)| id.as_str())
    }
}

/// Disjoint partition of a batch's ids into successes and failures.
#[derive(Debug)]
pub struct BatchOutcome<V> {
    successes: HashMap<String, V>,
    failures: HashMap<String, ItemFailure>,
}

impl<V> Default for BatchOutcome<V> {
    fn default() -> Self {
        Self {
            successes: HashMap::new(),
            failures: HashMap::new(),
        }
    }
}

impl<V> BatchOutcome<V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            successes: HashMap::with_capacity(capacity),
            failures: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, id: String, result: Result<V, ItemFailure>) {
        match result {
            Ok(value) => {
                self.successes.insert(id, value);
            }
            Err(failure) => {
                self.failures.insert(id, failure);
            }
        }
    }

    pub fn successes(&self) -> &HashMap<String, V> {
        &self.successes
    }

    pub fn failures(&self) -> &HashMap<String, ItemFailure> {
        &self.failures
    }

    pub fn success(&self, id: &str) -> Option<&V> {
        self.successes.get(id)
    }

    pub fn failure(&self, id: &str) -> Option<&ItemFailure> {
        self.failures.get(id)
    }

    /// Total number of ids, successful or not.
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.failures.values().filter(|f| f.is_cancelled()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Combined error for every failed item, `None` when nothing failed.
    pub fn error(&self) -> Option<BatchError> {
        if self.failures.is_empty() {
            return None;
        }
        let mut failures: Vec<(String, String)> = self
            .failures
            .iter()
            .map(|(id, failure)| (id.clone(), failure.to_string()))
            .collect();
        failures.sort();
        Some(BatchError { failures })
    }

    pub fn into_parts(self) -> (HashMap<String, V>, HashMap<String, ItemFailure>) {
        (self.successes, self.failures)
    }
}
