//! Recorded call type.

use crate::{Arg, Receiver};
use std::fmt;

/// A single recorded invocation.
///
/// Calls are immutable once recorded: the name of the function or method,
/// the receiver it was made on (absent for free functions), and the
/// positional arguments in parameter order.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Name of the function or method that was called.
    pub name: String,

    /// Facade the call arrived through, `None` for free functions.
    pub receiver: Option<Receiver>,

    /// Arguments in the same order as the function's parameters.
    pub args: Vec<Arg>,
}

impl Call {
    /// Creates a free-function call record.
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            args,
        }
    }

    /// Creates a method call record made on `receiver`.
    pub fn method(receiver: Receiver, name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            receiver: Some(receiver),
            args,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(receiver) = &self.receiver {
            write!(f, "{}.", receiver)?;
        }
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}
