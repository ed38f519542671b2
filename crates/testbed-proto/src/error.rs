//! Error types shared across Testbed crates.

/// Errors raised by proto helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot convert value to an argument: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience alias for results carrying a proto [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Default error type handed out by call recorders.
///
/// Programmed errors are data returned to the code under test, so this type
/// is cheap to clone and compares by message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{message}")]
pub struct StubError {
    message: String,
}

impl StubError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for StubError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for StubError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
