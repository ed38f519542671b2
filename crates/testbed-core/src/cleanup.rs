//! Cleanup Stack Manager.
//!
//! A `CleanupSuite` keeps two LIFO stacks of deferred actions, one for the
//! current test and one for the current suite. Each stack is valid between
//! its start and end signals and is unwound in reverse registration order
//! when its scope ends.
//!
//! `CleanupSuite` is neither `Clone` nor `Copy`, so registrations always
//! reach the instance that received the lifecycle signals.

use crate::context::panic_message;
use crate::env::{self, EnvError};
use crate::patch::{self, Slot};
use crate::suite::Suite;
use crate::TestContext;
use std::fmt;
use std::ffi::OsStr;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// A deferred action run when its scope ends.
pub type CleanupAction = Box<dyn FnOnce(&mut TestContext)>;

/// Lifecycle state of one cleanup stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeState {
    /// Outside the scope's start/end window. Registration is rejected.
    #[default]
    Uninitialized,
    /// Between the start and end signals.
    Active,
    /// The end signal is running the registered actions.
    Unwinding,
}

/// The scope a cleanup action was registered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Test,
    Suite,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Test => write!(f, "test"),
            Scope::Suite => write!(f, "suite"),
        }
    }
}

/// Misuse of the cleanup lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuiteError {
    /// No suite scope is active.
    #[error("unsafe to call add_cleanup without a suite")]
    NoSuite,
}

#[derive(Default)]
struct Stack {
    state: ScopeState,
    actions: Vec<CleanupAction>,
}

impl Stack {
    fn start(&mut self, scope: Scope) {
        if !self.actions.is_empty() {
            warn!(%scope, count = self.actions.len(), "Discarding cleanups left from a previous scope");
        }
        self.actions.clear();
        self.state = ScopeState::Active;
        debug!(%scope, "Cleanup scope started");
    }

    fn unwind(&mut self, scope: Scope, c: &mut TestContext) {
        self.state = ScopeState::Unwinding;
        debug!(%scope, count = self.actions.len(), "Running cleanups");
        while let Some(action) = self.actions.pop() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| action(c)));
            if let Err(payload) = result {
                c.fail(format!(
                    "{} cleanup panicked: {}",
                    scope,
                    panic_message(&*payload)
                ));
            }
        }
        self.state = ScopeState::Uninitialized;
    }
}

/// Two-scope cleanup stack manager.
///
/// Embed it in a suite type and forward the [`Suite`] hooks to it. Inside
/// the hooks and test bodies, [`add_cleanup`](Self::add_cleanup) registers
/// at test scope while a test is running and at suite scope otherwise.
/// Either way a suite must be active.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use testbed_core::{CleanupSuite, Suite, TestContext};
///
/// let x = Rc::new(Cell::new(42));
/// let mut s = CleanupSuite::new();
/// let mut c = TestContext::new("patch");
///
/// s.set_up_suite(&mut c);
/// s.set_up_test(&mut c);
/// s.patch_value(Rc::clone(&x), 99);
/// assert_eq!(x.get(), 99);
/// s.tear_down_test(&mut c);
/// assert_eq!(x.get(), 42);
/// s.tear_down_suite(&mut c);
/// c.finish();
/// ```
#[derive(Default)]
pub struct CleanupSuite {
    suite: Stack,
    test: Stack,
}

impl fmt::Debug for CleanupSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupSuite")
            .field("suite_state", &self.suite.state)
            .field("suite_pending", &self.suite.actions.len())
            .field("test_state", &self.test.state)
            .field("test_pending", &self.test.actions.len())
            .finish()
    }
}

impl CleanupSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the suite stack.
    pub fn suite_state(&self) -> ScopeState {
        self.suite.state
    }

    /// State of the test stack.
    pub fn test_state(&self) -> ScopeState {
        self.test.state
    }

    /// Number of actions waiting on the given stack.
    pub fn pending(&self, scope: Scope) -> usize {
        match scope {
            Scope::Test => self.test.actions.len(),
            Scope::Suite => self.suite.actions.len(),
        }
    }

    /// Picks the stack a registration made now belongs to. A test scope
    /// only counts inside an active suite.
    fn current(&mut self) -> Result<(Scope, &mut Stack), SuiteError> {
        if self.suite.state != ScopeState::Active {
            Err(SuiteError::NoSuite)
        } else if self.test.state == ScopeState::Active {
            Ok((Scope::Test, &mut self.test))
        } else {
            Ok((Scope::Suite, &mut self.suite))
        }
    }

    fn push(&mut self, action: CleanupAction) -> Result<Scope, SuiteError> {
        let (scope, stack) = self.current()?;
        stack.actions.push(action);
        debug!(%scope, pending = stack.actions.len(), "Registered cleanup");
        Ok(scope)
    }

    /// Registers `action`, returning the scope it landed in.
    pub fn try_add_cleanup(
        &mut self,
        action: impl FnOnce(&mut TestContext) + 'static,
    ) -> Result<Scope, SuiteError> {
        self.push(Box::new(action))
    }

    /// Registers `action` at the current scope.
    ///
    /// # Panics
    ///
    /// Panics if no suite is active.
    #[track_caller]
    pub fn add_cleanup(&mut self, action: impl FnOnce(&mut TestContext) + 'static) -> Scope {
        match self.try_add_cleanup(action) {
            Ok(scope) => scope,
            Err(err) => panic!("{}", err),
        }
    }

    /// Replaces the value behind `dest` until the current scope ends.
    ///
    /// # Panics
    ///
    /// Panics if no suite is active. The value is left
    /// untouched in that case.
    #[track_caller]
    pub fn patch_value<D>(&mut self, dest: D, value: <D::Target as Slot>::Value) -> Scope
    where
        D: Deref + 'static,
        D::Target: Slot,
        <D::Target as Slot>::Value: 'static,
    {
        if let Err(err) = self.current() {
            panic!("{}", err);
        }
        let guard = patch::patch_value(dest, value);
        self.add_cleanup(move |_| guard.restore())
    }

    /// Sets an environment variable until the current scope ends. A
    /// variable that was unset is unset again afterwards.
    ///
    /// # Panics
    ///
    /// Panics if no suite is active, or if the name or
    /// value is invalid.
    #[track_caller]
    pub fn patch_environment(&mut self, name: &str, value: impl AsRef<OsStr>) -> Scope {
        if let Err(err) = self.current() {
            panic!("{}", err);
        }
        let guard = env::patch_environment(name, value).unwrap_or_else(|err| panic!("{}", err));
        self.add_cleanup(move |_| guard.restore())
    }

    /// Prepends `dir` to `PATH` until the current scope ends.
    ///
    /// # Panics
    ///
    /// Panics if no suite is active, or if the path list
    /// cannot be built.
    #[track_caller]
    pub fn patch_env_path_prepend(&mut self, dir: impl AsRef<Path>) -> Scope {
        if let Err(err) = self.current() {
            panic!("{}", err);
        }
        let guard = env::patch_env_path_prepend(dir)
            .unwrap_or_else(|err: EnvError| panic!("{}", err));
        self.add_cleanup(move |_| guard.restore())
    }
}

impl Suite for CleanupSuite {
    fn set_up_suite(&mut self, _c: &mut TestContext) {
        self.suite.start(Scope::Suite);
    }

    fn tear_down_suite(&mut self, c: &mut TestContext) {
        if self.test.state == ScopeState::Active {
            warn!("Suite ended while a test was active; running its cleanups first");
            self.test.unwind(Scope::Test, c);
        }
        self.suite.unwind(Scope::Suite, c);
    }

    fn set_up_test(&mut self, _c: &mut TestContext) {
        self.test.start(Scope::Test);
    }

    fn tear_down_test(&mut self, c: &mut TestContext) {
        self.test.unwind(Scope::Test, c);
    }
}
