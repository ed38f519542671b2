//! # testbed-proto
//!
//! Shared types and error definitions for the Testbed framework.
//!
//! This crate provides the foundational data used across all Testbed crates,
//! including:
//! - Argument values recorded by test doubles
//! - Receiver identity for calls made through facade types
//! - The recorded call type
//! - Common error types

mod arg;
mod call;
mod error;
mod receiver;

pub use arg::Arg;
pub use call::Call;
pub use error::{Error, Result, StubError};
pub use receiver::Receiver;
