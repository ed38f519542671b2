//! Receiver identity for method calls recorded through facade types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RECEIVER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of the object a call was made on.
///
/// A facade creates one `Receiver` when it is constructed and passes it to
/// every method call it records. The token owns nothing; two receivers are
/// equal only if one was cloned from the other.
#[derive(Debug, Clone)]
pub struct Receiver {
    id: u64,
    label: &'static str,
}

impl Receiver {
    /// Creates a new receiver identity with the given label.
    pub fn new(label: &'static str) -> Self {
        Self {
            id: NEXT_RECEIVER_ID.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    /// Creates a new receiver identity labelled with the type name of `T`.
    pub fn of<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// Returns the process-unique id of this receiver.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the human-readable label.
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl PartialEq for Receiver {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Receiver {}

impl std::hash::Hash for Receiver {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}
