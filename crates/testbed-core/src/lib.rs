//! # testbed-core
//!
//! Core testing-support functionality for the Testbed framework.
//!
//! This crate provides:
//! - A call recorder that backs stub, mock and fake test doubles
//! - The cleanup stack manager that drives suite and test teardown
//! - Value and environment patching that restores on teardown
//! - Environment isolation and log capture suites
//! - Comparison checkers and a non-fatal failure-reporting test context
//! - Tag-based test selection and a suite runner

mod checkers;
mod cleanup;
mod config;
mod context;
mod env;
mod logging;
mod osenv;
mod patch;
mod recorder;
mod suite;
pub mod tags;

pub use checkers::{
    After, Almost, Before, Checker, Contains, DurationLessThan, ErrorIs, ErrorMatches, HasPrefix,
    HasSuffix, Ignore, JsonEquals, MultiChecker, PanicMatches, SameContents, TimeBetween,
    YamlEquals,
};
pub use cleanup::{CleanupAction, CleanupSuite, Scope, ScopeState, SuiteError};
pub use config::{
    CONFIG_ENV, ConfigError, ConfigWarning, DEFAULT_LOG_FILTER, EnvConfig, LOGGING_ENV, SMOKE_ENV,
    TAGS_ENV, TestbedConfig,
};
pub use context::{Failure, TestContext};
pub use env::{EnvError, EnvGuard, patch_env_path_prepend, patch_environment};
pub use logging::{CaptureWriter, LogCapture, LoggingSuite};
pub use osenv::OsEnvSuite;
pub use patch::{PatchGuard, Slot, patch_value};
pub use recorder::{CallRecorder, ExpectedCall, ReceiverMatch};
pub use suite::{RunReport, Suite, SuiteRunner, TestOutcome, TestResult};
pub use tags::TagFilter;
