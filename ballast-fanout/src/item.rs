//! Units of work submitted to the executor.

/// Anything with an id that is unique within its batch.
///
/// The payload is opaque to the executor and only the worker looks at it.
pub trait WorkItem: Send + 'static {
    fn id(&self) -> &str;
}

/// An id paired with an arbitrary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem<P> {
    pub id: String,
    pub payload: P,
}

impl<P> BatchItem<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

impl<P: Send + 'static> WorkItem for BatchItem<P> {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A bare id is its own work item.
impl WorkItem for String {
    fn id(&self) -> &str {
        self
    }
}
